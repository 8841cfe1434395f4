//! Batch enrichment orchestrator.
//!
//! One run resets stale claims, claims a batch, groups it by owning user, and
//! for each group calls the extraction collaborator once while embedding the
//! group's notes concurrently. Each note is then persisted in its own
//! transaction. Sub-steps run inside savepoints so one bad mention or
//! relationship is skipped without losing the rest of the note; only the
//! summary write is fatal to the note.
//!
//! Delivery is at-least-once. Every write below is idempotent, so a note
//! reclaimed after a crash converges to the same state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use notegraph_core::{
    defaults, log_prefix, normalize_name, AnsweredClarification, Claim, ClaimedItem, EmbeddingBackend,
    EntityExtra, EntityKind, EntityMention, EntityRef, Error, ExtractionBackend, ExtractionNote,
    ExtractionRequest, KnownNames, NoteExtraction, QueueRepository, Result, Vector,
};
use notegraph_db::{action_items, entities, notes, relationships, tx, Database, NewActionItem};
use notegraph_inference::note_embedding_text;
use sqlx::PgConnection;

use crate::clarification::ClarificationWorkflow;
use crate::config::EnrichmentConfig;
use crate::suggestions::SuggestionService;

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub stale_reset: u64,
    pub groups: usize,
}

/// Per-group result, collected before the queue is updated.
#[derive(Debug, Default)]
struct GroupOutcome {
    completed: Vec<Claim>,
    failed: Vec<(Claim, String)>,
}

impl GroupOutcome {
    fn all_failed(items: &[ClaimedItem], message: &str) -> Self {
        Self {
            completed: Vec::new(),
            failed: items
                .iter()
                .map(|i| (i.claim(), message.to_string()))
                .collect(),
        }
    }
}

/// Counts of what one note's transaction wrote.
#[derive(Debug, Default)]
struct NoteStats {
    entities: usize,
    action_items: usize,
    relationships: usize,
    tags_added: u64,
    embedding_stored: bool,
}

/// Entities resolved inside one note's transaction, keyed by normalized name.
type ResolvedCache = HashMap<(EntityKind, String), Uuid>;

/// Partition a claimed batch by owning user, keeping claim order per user.
pub fn group_by_user(items: Vec<ClaimedItem>) -> BTreeMap<Uuid, Vec<ClaimedItem>> {
    let mut groups: BTreeMap<Uuid, Vec<ClaimedItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.user_id).or_default().push(item);
    }
    groups
}

fn mention_extra(kind: EntityKind, mention: &EntityMention) -> Option<EntityExtra> {
    let non_blank = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match kind {
        EntityKind::Company => non_blank(&mention.category).map(EntityExtra::Category),
        EntityKind::Project => non_blank(&mention.status).map(EntityExtra::Status),
        EntityKind::Person => None,
    }
}

/// Question raised when suggestions recommend a new project.
pub fn create_project_question(label: &str) -> String {
    format!(
        "This note mentions the project \"{}\", which doesn't match any existing project. Should it be created?",
        label
    )
}

/// Find or create an entity and link it to the note.
async fn resolve_and_link(
    conn: &mut PgConnection,
    kind: EntityKind,
    user_id: Uuid,
    note_id: Uuid,
    name: &str,
    extra: Option<&EntityExtra>,
) -> Result<Uuid> {
    let resolved = entities::find_or_create_in(conn, kind, user_id, name, extra).await?;
    entities::link_in(conn, kind, note_id, resolved.id).await?;
    Ok(resolved.id)
}

/// Resolve a mention inside a savepoint, reusing earlier resolutions of the
/// same normalized name within this note.
///
/// The outer `Result` is fatal to the note; the inner one only to the mention.
async fn resolve_cached(
    conn: &mut PgConnection,
    cache: &mut ResolvedCache,
    kind: EntityKind,
    item: &ClaimedItem,
    name: &str,
    extra: Option<&EntityExtra>,
) -> Result<Result<Uuid>> {
    let key = match normalize_name(name) {
        Ok(key) => key,
        Err(e) => return Ok(Err(e)),
    };
    if extra.is_none() {
        if let Some(id) = cache.get(&(kind, key.clone())) {
            return Ok(Ok(*id));
        }
    }

    let mut sp = tx::savepoint(conn).await?;
    let outcome = resolve_and_link(&mut sp, kind, item.user_id, item.note_id, name, extra).await;
    let settled = tx::settle(sp, outcome).await?;
    if let Ok(id) = &settled {
        cache.insert((kind, key), *id);
        trace!(
            entity_kind = kind.as_str(),
            entity_id = %id,
            "Resolved mention"
        );
    }
    Ok(settled)
}

/// Runs enrichment batches against the queue.
#[derive(Clone)]
pub struct EnrichmentOrchestrator {
    db: Database,
    extractor: Arc<dyn ExtractionBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    clarifications: ClarificationWorkflow,
    suggestions: SuggestionService,
    config: EnrichmentConfig,
}

impl EnrichmentOrchestrator {
    pub fn new(
        db: Database,
        extractor: Arc<dyn ExtractionBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
        clarifications: ClarificationWorkflow,
        suggestions: SuggestionService,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            db,
            extractor,
            embedder,
            clarifications,
            suggestions,
            config,
        }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Process one batch from the queue.
    ///
    /// Errors are returned only when the queue itself cannot be read or
    /// updated. Per-group and per-note failures are recorded on their queue
    /// items and counted in the report.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "orchestrator", op = "run"))]
    pub async fn run(&self) -> Result<BatchReport> {
        let start = Instant::now();

        let stale_reset = self.db.queue.reset_stale(self.config.stale_after_secs).await?;
        if stale_reset > 0 {
            info!(stale_reset, "Reset stale queue items");
        }

        let claimed = self.db.queue.claim_batch(self.config.batch_size).await?;
        if claimed.is_empty() {
            debug!("Queue empty");
            return Ok(BatchReport {
                stale_reset,
                ..Default::default()
            });
        }

        let claimed_count = claimed.len();
        let groups = group_by_user(claimed);
        let group_count = groups.len();
        debug!(batch_size = claimed_count, groups = group_count, "Claimed batch");

        let outcomes: Vec<GroupOutcome> = stream::iter(groups)
            .map(|(user_id, items)| self.process_group(user_id, items))
            .buffer_unordered(self.config.max_concurrent_groups.max(1))
            .collect()
            .await;

        let mut completed: Vec<Claim> = Vec::new();
        let mut failed = 0usize;
        for outcome in outcomes {
            for (claim, message) in outcome.failed {
                failed += 1;
                match self.db.queue.fail_claim(claim, &message).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        queue_item_id = %claim.queue_item_id,
                        attempts = claim.attempts,
                        "Claim lost to another worker, failure not recorded"
                    ),
                    Err(e) => error!(
                        queue_item_id = %claim.queue_item_id,
                        error = %e,
                        "Failed to record queue item failure"
                    ),
                }
            }
            completed.extend(outcome.completed);
        }
        self.db.queue.complete_claims(&completed).await?;

        let report = BatchReport {
            claimed: claimed_count,
            completed: completed.len(),
            failed,
            stale_reset,
            groups: group_count,
        };
        info!(
            batch_size = report.claimed,
            completed = report.completed,
            failed = report.failed,
            groups = report.groups,
            duration_ms = start.elapsed().as_millis() as u64,
            "Enrichment batch finished"
        );
        Ok(report)
    }

    #[instrument(
        skip(self, items),
        fields(subsystem = "jobs", component = "orchestrator", user_id = %user_id, batch_size = items.len())
    )]
    async fn process_group(&self, user_id: Uuid, items: Vec<ClaimedItem>) -> GroupOutcome {
        let knowledge = match self
            .db
            .entities
            .known_names(user_id, self.config.context_limit)
            .await
        {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "Failed to load known names, extracting without context");
                KnownNames::default()
            }
        };

        let note_ids: Vec<Uuid> = items.iter().map(|i| i.note_id).collect();
        let answered = match self.db.clarifications.answered_for_notes(&note_ids).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Failed to load answered clarifications");
                Vec::new()
            }
        };
        let mut answers_by_note: HashMap<Uuid, Vec<AnsweredClarification>> = HashMap::new();
        let mut answered_ids: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for c in answered {
            if let Some(answer) = c.answer {
                answers_by_note
                    .entry(c.note_id)
                    .or_default()
                    .push(AnsweredClarification {
                        question: c.question,
                        answer,
                    });
                answered_ids.entry(c.note_id).or_default().push(c.id);
            }
        }

        let request = ExtractionRequest {
            user_id,
            notes: items
                .iter()
                .map(|i| ExtractionNote {
                    id: i.note_id,
                    title: i.title.clone(),
                    content: i.content.clone(),
                    user_id,
                    clarifications: answers_by_note.remove(&i.note_id).unwrap_or_default(),
                })
                .collect(),
            knowledge,
        };

        let to_embed: Vec<(Uuid, String)> = items
            .iter()
            .filter(|i| !i.has_embedding)
            .map(|i| (i.note_id, note_embedding_text(&i.title, &i.content)))
            .collect();

        let extraction_timeout = self.config.extraction_timeout();
        let (extracted, embedded) = tokio::join!(
            timeout(extraction_timeout, self.extractor.extract(&request)),
            self.embed_notes(to_embed)
        );

        let response = match extracted {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, model = self.extractor.model_name(), "Extraction failed for group");
                return GroupOutcome::all_failed(&items, &format!("extraction failed: {}", e));
            }
            Err(_) => {
                let e = Error::Timeout(format!(
                    "extraction exceeded {}s",
                    extraction_timeout.as_secs()
                ));
                warn!(error = %e, model = self.extractor.model_name(), "Extraction timed out for group");
                return GroupOutcome::all_failed(&items, &e.to_string());
            }
        };

        let mut outcome = GroupOutcome::default();
        for item in &items {
            let extraction = match response.for_note(item.note_id) {
                Ok(extraction) => extraction,
                Err(e) => {
                    let raw = response
                        .results
                        .get(&item.note_id)
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    warn!(
                        note_id = %item.note_id,
                        error = %e,
                        raw_prefix = log_prefix(&raw, defaults::RAW_LOG_PREFIX_CHARS),
                        "Unusable extraction for note"
                    );
                    outcome.failed.push((item.claim(), e.to_string()));
                    continue;
                }
            };

            match self
                .persist_note(item, &extraction, embedded.get(&item.note_id))
                .await
            {
                Ok(stats) => {
                    debug!(
                        note_id = %item.note_id,
                        entities = stats.entities,
                        action_items = stats.action_items,
                        relationships = stats.relationships,
                        tags_added = stats.tags_added,
                        embedding_stored = stats.embedding_stored,
                        "Note enriched"
                    );
                    outcome.completed.push(item.claim());
                    let applied = answered_ids.remove(&item.note_id).unwrap_or_default();
                    self.after_commit(item, &extraction, &applied).await;
                }
                Err(e) => {
                    warn!(note_id = %item.note_id, error = %e, "Note enrichment failed");
                    outcome.failed.push((item.claim(), e.to_string()));
                }
            }
        }
        outcome
    }

    /// Embed each note separately so one failure only costs that note its
    /// embedding.
    async fn embed_notes(&self, to_embed: Vec<(Uuid, String)>) -> HashMap<Uuid, Vector> {
        let embedding_timeout: Duration = self.config.embedding_timeout();
        let embedder = &self.embedder;

        let results = join_all(to_embed.into_iter().map(|(note_id, text)| async move {
            let outcome = match timeout(
                embedding_timeout,
                embedder.embed_texts(std::slice::from_ref(&text)),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!(
                    "embedding exceeded {}s",
                    embedding_timeout.as_secs()
                ))),
            };
            (note_id, outcome)
        }))
        .await;

        let mut embeddings = HashMap::new();
        for (note_id, outcome) in results {
            match outcome {
                Ok(mut vectors) if vectors.len() == 1 => {
                    embeddings.insert(note_id, vectors.remove(0));
                }
                Ok(vectors) => {
                    warn!(note_id = %note_id, count = vectors.len(), "Unexpected embedding count");
                }
                Err(e) => {
                    warn!(
                        note_id = %note_id,
                        error = %e,
                        model = embedder.model_name(),
                        "Embedding failed, note keeps no embedding"
                    );
                }
            }
        }
        embeddings
    }

    /// Write one note's enrichment in a single transaction.
    async fn persist_note(
        &self,
        item: &ClaimedItem,
        extraction: &NoteExtraction,
        embedding: Option<&Vector>,
    ) -> Result<NoteStats> {
        let mut note_tx = self.db.pool.begin().await.map_err(Error::Database)?;
        notes::apply_summary_in(&mut note_tx, item.note_id, &extraction.summary.to_json()).await?;

        let mut stats = NoteStats::default();
        let mut cache = ResolvedCache::new();

        let mentions = [
            (EntityKind::Person, &extraction.entities.people),
            (EntityKind::Company, &extraction.entities.companies),
            (EntityKind::Project, &extraction.entities.projects),
        ];
        for (kind, list) in mentions {
            for mention in list {
                let extra = mention_extra(kind, mention);
                match resolve_cached(&mut note_tx, &mut cache, kind, item, &mention.name, extra.as_ref())
                    .await?
                {
                    Ok(_) => stats.entities += 1,
                    Err(e) => warn!(
                        note_id = %item.note_id,
                        entity_kind = kind.as_str(),
                        error = %e,
                        "Skipping entity mention"
                    ),
                }
            }
        }

        for action in extraction.action_items.iter().filter(|a| a.should_persist()) {
            let assignee = match action
                .assignee
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                Some(name) => {
                    match resolve_cached(&mut note_tx, &mut cache, EntityKind::Person, item, name, None)
                        .await?
                    {
                        Ok(id) => Some(id),
                        Err(e) => {
                            warn!(note_id = %item.note_id, error = %e, "Dropping unresolvable assignee");
                            None
                        }
                    }
                }
                None => None,
            };

            let new_item = NewActionItem {
                note_id: item.note_id,
                user_id: item.user_id,
                text: &action.text,
                assignee_person_id: assignee,
                priority: action.priority.as_deref(),
                source: action.source.as_str(),
                due_date: action.due_date.as_deref(),
            };
            let mut sp = tx::savepoint(&mut note_tx).await?;
            let inserted = action_items::insert_in(&mut sp, &new_item).await;
            match tx::settle(sp, inserted).await? {
                Ok(true) => stats.action_items += 1,
                Ok(false) => trace!(note_id = %item.note_id, "Action item already recorded"),
                Err(e) => warn!(note_id = %item.note_id, error = %e, "Skipping action item"),
            }
        }

        for rel in extraction.relationships.iter().filter(|r| r.certain) {
            let kinds = rel
                .source_type
                .parse::<EntityKind>()
                .and_then(|s| rel.target_type.parse::<EntityKind>().map(|t| (s, t)));
            let (source_kind, target_kind) = match kinds {
                Ok(kinds) => kinds,
                Err(e) => {
                    warn!(note_id = %item.note_id, error = %e, "Skipping relationship");
                    continue;
                }
            };

            let source = resolve_cached(&mut note_tx, &mut cache, source_kind, item, &rel.source, None).await?;
            let target = resolve_cached(&mut note_tx, &mut cache, target_kind, item, &rel.target, None).await?;
            let (source_id, target_id) = match (source, target) {
                (Ok(s), Ok(t)) => (s, t),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(note_id = %item.note_id, error = %e, "Skipping relationship endpoint");
                    continue;
                }
            };

            let mut sp = tx::savepoint(&mut note_tx).await?;
            let upserted = relationships::upsert_in(
                &mut sp,
                item.user_id,
                EntityRef {
                    kind: source_kind,
                    id: source_id,
                },
                EntityRef {
                    kind: target_kind,
                    id: target_id,
                },
                &rel.relationship,
                rel.context.as_deref(),
                item.note_id,
            )
            .await;
            match tx::settle(sp, upserted).await? {
                Ok(upsert) => {
                    stats.relationships += 1;
                    trace!(
                        relationship_id = %upsert.id,
                        confirmation_count = upsert.confirmation_count,
                        "Relationship recorded"
                    );
                }
                Err(e) => warn!(note_id = %item.note_id, error = %e, "Skipping relationship"),
            }
        }

        let tags = extraction.normalized_tags();
        if !tags.is_empty() {
            let mut sp = tx::savepoint(&mut note_tx).await?;
            let merged = notes::merge_tags_in(&mut sp, item.note_id, &tags).await;
            match tx::settle(sp, merged).await? {
                Ok(added) => stats.tags_added = added,
                Err(e) => warn!(note_id = %item.note_id, error = %e, "Skipping tag merge"),
            }
        }

        if let Some(vector) = embedding {
            let mut sp = tx::savepoint(&mut note_tx).await?;
            let stored = notes::store_embedding_if_missing_in(&mut sp, item.note_id, vector).await;
            match tx::settle(sp, stored).await? {
                Ok(written) => stats.embedding_stored = written,
                Err(e) => warn!(note_id = %item.note_id, error = %e, "Skipping embedding write"),
            }
        }

        note_tx.commit().await.map_err(Error::Database)?;
        Ok(stats)
    }

    /// Best-effort follow-ups once a note's enrichment is committed.
    async fn after_commit(&self, item: &ClaimedItem, extraction: &NoteExtraction, applied: &[Uuid]) {
        if !applied.is_empty() {
            if let Err(e) = self.db.clarifications.apply_ids(applied).await {
                warn!(note_id = %item.note_id, error = %e, "Failed to mark clarifications applied");
            }
        }

        for question in extraction.questions() {
            if let Err(e) = self
                .clarifications
                .raise_and_notify(item.note_id, item.user_id, question)
                .await
            {
                warn!(note_id = %item.note_id, error = %e, "Failed to raise clarification");
            }
        }

        if self.config.suggest_projects {
            self.suggest_for(item, extraction).await;
        }
    }

    async fn suggest_for(&self, item: &ClaimedItem, extraction: &NoteExtraction) {
        match self.db.entities.linked_ids(EntityKind::Project, item.note_id).await {
            Ok(linked) if !linked.is_empty() => return,
            Ok(_) => {}
            Err(e) => {
                warn!(note_id = %item.note_id, error = %e, "Failed to read linked projects");
                return;
            }
        }

        let label = extraction
            .project_label
            .as_deref()
            .or(item.project_label.as_deref());
        let suggestions = match self
            .suggestions
            .suggest_and_store(item.user_id, item.note_id, label)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(note_id = %item.note_id, error = %e, "Project suggestion failed");
                return;
            }
        };

        if let (true, Some(proposed)) = (suggestions.should_create_new, &suggestions.proposed_label) {
            if let Err(e) = self
                .clarifications
                .raise_and_notify(item.note_id, item.user_id, &create_project_question(proposed))
                .await
            {
                warn!(note_id = %item.note_id, error = %e, "Failed to raise project question");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claimed(user_id: Uuid, title: &str) -> ClaimedItem {
        ClaimedItem {
            queue_item_id: Uuid::new_v4(),
            note_id: Uuid::new_v4(),
            user_id,
            priority: 0,
            attempts: 1,
            created_at: Utc::now(),
            title: title.to_string(),
            content: String::new(),
            project_label: None,
            has_embedding: false,
        }
    }

    #[test]
    fn test_group_by_user_keeps_claim_order() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let items = vec![
            claimed(alice, "a1"),
            claimed(bob, "b1"),
            claimed(alice, "a2"),
        ];

        let groups = group_by_user(items);
        assert_eq!(groups.len(), 2);
        let titles: Vec<&str> = groups[&alice].iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a1", "a2"]);
        assert_eq!(groups[&bob].len(), 1);
    }

    #[test]
    fn test_group_by_user_empty() {
        assert!(group_by_user(Vec::new()).is_empty());
    }

    #[test]
    fn test_all_failed_covers_every_item() {
        let user = Uuid::new_v4();
        let items = vec![claimed(user, "x"), claimed(user, "y")];
        let outcome = GroupOutcome::all_failed(&items, "extraction failed: boom");
        assert!(outcome.completed.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.failed[0].0, items[0].claim());
        assert_eq!(outcome.failed[1].1, "extraction failed: boom");
    }

    #[test]
    fn test_mention_extra_by_kind() {
        let mention = EntityMention {
            name: "Acme".to_string(),
            category: Some("client".to_string()),
            status: Some("paused".to_string()),
        };
        assert_eq!(
            mention_extra(EntityKind::Company, &mention),
            Some(EntityExtra::Category("client".to_string()))
        );
        assert_eq!(
            mention_extra(EntityKind::Project, &mention),
            Some(EntityExtra::Status("paused".to_string()))
        );
        assert_eq!(mention_extra(EntityKind::Person, &mention), None);

        let blank = EntityMention {
            name: "Acme".to_string(),
            category: Some("  ".to_string()),
            status: None,
        };
        assert_eq!(mention_extra(EntityKind::Company, &blank), None);
    }

    #[test]
    fn test_create_project_question_names_label() {
        assert!(create_project_question("Atlas").contains("\"Atlas\""));
    }
}
