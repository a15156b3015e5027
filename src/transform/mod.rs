//! Record transformation.
//!
//! A [`RecordTransformer`] turns one source record into a new record of a
//! target entity according to a [`TransformConfig`], optionally cascading to
//! detail rows and writing the new id back onto the source. Every write of a
//! single transform happens in one [`StoreTransaction`].

pub mod config_manager;
pub mod conversion;

pub use config_manager::{TransformConfigEntry, TransformConfigManager};
pub use conversion::FieldValueConversion;

use crate::config::{FieldMapping, TransformConfig};
use crate::constants::MAX_COMMIT_ATTEMPTS;
use crate::error::{TransformError, TransformResult};
use crate::filter::FilterGate;
use crate::record::{Record, RecordId};
use crate::schema::{EntitySchema, SchemaCatalog};
use crate::service::PersistenceService;
use crate::store::{CommitOutcome, RecordStore, RowQuery, RowReader, StoreTransaction};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Non-fatal problem found while transforming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformWarning {
    /// A mapped source field no longer exists and was skipped
    UnknownSourceField { entity: String, field: String },
}

impl fmt::Display for TransformWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformWarning::UnknownSourceField { entity, field } => {
                write!(f, "unknown field {}.{} skipped", entity, field)
            }
        }
    }
}

/// Outcome of a successful transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformReport {
    /// Id of the new main target record
    pub record_id: RecordId,
    pub detail_ids: Vec<RecordId>,
    /// Whether the new id was written back onto the source
    pub filled_back: bool,
    pub warnings: Vec<TransformWarning>,
}

/// Collaborators a transformer works through.
#[derive(Clone)]
pub struct TransformContext {
    pub store: RecordStore,
    pub catalog: Arc<dyn SchemaCatalog>,
    pub persistence: Arc<dyn PersistenceService>,
    pub filter_gate: Arc<dyn FilterGate>,
}

/// Target-side detail setup resolved when the transformer is built.
struct DetailTarget {
    schema: Arc<EntitySchema>,
    link_field: String,
}

pub struct RecordTransformer {
    context: TransformContext,
    target: Arc<EntitySchema>,
    target_detail: Option<DetailTarget>,
    config: TransformConfig,
    actor: String,
    expected_source: Option<String>,
}

impl RecordTransformer {
    /// Builds a transformer into `target_entity`, checking every mapped target
    /// field against the catalog.
    pub fn new(
        context: TransformContext,
        target_entity: &str,
        config: TransformConfig,
        actor: &str,
    ) -> TransformResult<Self> {
        let target = context.catalog.entity(target_entity)?;
        check_targets(&target, config.fields_mapping())?;

        let target_detail = match config.fields_mapping_detail() {
            Some(detail_mapping) => {
                let schema = context.catalog.detail_entity(&target)?.ok_or_else(|| {
                    TransformError::Configuration(format!(
                        "Detail mapping given but target entity {} has no detail entity",
                        target.name
                    ))
                })?;
                check_targets(&schema, detail_mapping)?;
                let link_field = context.catalog.parent_link_field(&schema)?;
                Some(DetailTarget { schema, link_field })
            }
            None => None,
        };

        Ok(Self {
            context,
            target,
            target_detail,
            config,
            actor: actor.to_string(),
            expected_source: None,
        })
    }

    /// Restricts source records to one entity.
    pub fn with_expected_source(mut self, entity: &str) -> Self {
        self.expected_source = Some(entity.to_string());
        self
    }

    pub fn target_entity(&self) -> &str {
        &self.target.name
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Whether the source record passes the configured filter. Read only.
    pub fn check_filter(&self, source_id: RecordId) -> TransformResult<bool> {
        self.context
            .filter_gate
            .evaluate(self.config.use_filter(), &source_id)
    }

    /// Transforms `source_id` and returns the id of the new target record.
    pub fn transform(&self, source_id: RecordId) -> TransformResult<RecordId> {
        self.transform_with_report(source_id)
            .map(|report| report.record_id)
    }

    /// Like [`transform`](Self::transform) but also reports detail ids,
    /// fillback and warnings.
    ///
    /// If another commit changes a record this transform read before it
    /// commits, the whole unit of work is discarded and run again from fresh
    /// reads.
    pub fn transform_with_report(&self, source_id: RecordId) -> TransformResult<TransformReport> {
        let source = self.resolve_source(source_id)?;
        let source_detail = match self.config.fields_mapping_detail() {
            Some(_) => Some(self.context.catalog.detail_entity(&source)?.ok_or_else(|| {
                TransformError::Configuration(format!(
                    "Detail mapping given but source entity {} has no detail entity",
                    source.name
                ))
            })?),
            None => None,
        };

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut tx = self.context.store.begin();
            let report = match self.run(&mut tx, &source, source_detail.as_deref(), source_id) {
                Ok(report) => report,
                Err(e) => {
                    warn!("Transform of {} rolled back: {}", source_id, e);
                    tx.rollback();
                    return Err(e);
                }
            };
            match tx.try_commit()? {
                CommitOutcome::Committed => {
                    info!(
                        "Transformed {} {} into {} {} ({} details)",
                        source.name,
                        source_id,
                        self.target.name,
                        report.record_id,
                        report.detail_ids.len()
                    );
                    return Ok(report);
                }
                CommitOutcome::Conflict { key } => {
                    warn!(
                        "Transform of {} conflicted on {} (attempt {} of {})",
                        source_id, key, attempt, MAX_COMMIT_ATTEMPTS
                    );
                }
            }
        }
        Err(TransformError::Persistence(format!(
            "Transform of {} kept conflicting with concurrent writes",
            source_id
        )))
    }

    fn resolve_source(&self, source_id: RecordId) -> TransformResult<Arc<EntitySchema>> {
        let source = self.context.catalog.entity_by_code(source_id.entity_code())?;
        if let Some(expected) = &self.expected_source {
            if expected != &source.name {
                return Err(TransformError::Configuration(format!(
                    "Record {} belongs to {} but this transform reads {}",
                    source_id, source.name, expected
                )));
            }
        }
        Ok(source)
    }

    fn run(
        &self,
        tx: &mut StoreTransaction,
        source: &EntitySchema,
        source_detail: Option<&EntitySchema>,
        source_id: RecordId,
    ) -> TransformResult<TransformReport> {
        let mut warnings = Vec::new();
        let record_id = self.transform_record(
            tx,
            source,
            &self.target,
            self.config.fields_mapping(),
            source_id,
            &Map::new(),
            &mut warnings,
        )?;

        let mut detail_ids = Vec::new();
        if let (Some(mapping), Some(source_detail), Some(target_detail)) = (
            self.config.fields_mapping_detail(),
            source_detail,
            self.target_detail.as_ref(),
        ) {
            let source_link = self.context.catalog.parent_link_field(source_detail)?;
            let query = RowQuery::select(&source_detail.name, [source_detail.primary_field()])
                .where_eq(&source_link, Value::String(source_id.to_string()));
            let rows = tx.query(&query)?;
            debug!(
                "Found {} {} rows under {}",
                rows.len(),
                source_detail.name,
                source_id
            );

            let mut defaults = Map::new();
            defaults.insert(
                target_detail.link_field.clone(),
                Value::String(record_id.to_string()),
            );
            for row in rows {
                detail_ids.push(self.transform_record(
                    tx,
                    source_detail,
                    &target_detail.schema,
                    mapping,
                    row.id(),
                    &defaults,
                    &mut warnings,
                )?);
            }
        }

        let filled_back = self.fillback(tx, source, source_id, record_id, &mut warnings)?;
        Ok(TransformReport {
            record_id,
            detail_ids,
            filled_back,
            warnings,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transform_record(
        &self,
        tx: &mut StoreTransaction,
        source: &EntitySchema,
        target: &EntitySchema,
        mapping: &FieldMapping,
        source_id: RecordId,
        defaults: &Map<String, Value>,
        warnings: &mut Vec<TransformWarning>,
    ) -> TransformResult<RecordId> {
        let mut record = Record::for_new(&target.name, &self.actor);
        for (field, value) in defaults {
            record.set(field, value.clone());
        }

        let mut found = Vec::new();
        let valid: Vec<&str> = mapping
            .sources()
            .into_iter()
            .filter(|field| self.context.catalog.field_exists(source, field, &mut found))
            .collect();
        for warning in found {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }

        let query = RowQuery::select(&source.name, valid).where_id(source_id);
        let row = tx
            .query_one(&query)?
            .ok_or(TransformError::SourceNotFound(source_id))?;

        for pair in mapping.iter() {
            if defaults.contains_key(&pair.target) {
                debug!("Keeping default for {}.{}", target.name, pair.target);
                continue;
            }
            let value = match row.get(&pair.source) {
                Some(value) => value,
                None => continue,
            };
            let converted = FieldValueConversion::new(
                source.descriptor(&pair.source)?,
                target.descriptor(&pair.target)?,
                self.context.catalog.as_ref(),
            )
            .convert(value)?;
            debug!(
                "{}.{} -> {}.{}: {}",
                source.name, pair.source, target.name, pair.target, converted
            );
            record.set(&pair.target, converted);
        }

        let created = self.context.persistence.create(tx, record)?;
        created.id().ok_or_else(|| {
            TransformError::Persistence(format!(
                "Persistence service returned a {} record without id",
                target.name
            ))
        })
    }

    fn fillback(
        &self,
        tx: &mut StoreTransaction,
        source: &EntitySchema,
        source_id: RecordId,
        new_id: RecordId,
        warnings: &mut Vec<TransformWarning>,
    ) -> TransformResult<bool> {
        let field = match self.config.fillback_field() {
            Some(field) => field,
            None => return Ok(false),
        };
        if !self.context.catalog.field_exists(source, field, warnings) {
            return Ok(false);
        }

        let primary = self.target.primary_field();
        let value = FieldValueConversion::new(
            self.target.descriptor(&primary)?,
            source.descriptor(field)?,
            self.context.catalog.as_ref(),
        )
        .convert(&Value::String(new_id.to_string()))?;

        let mut update = Record::for_update(source_id, &source.name, &self.actor);
        update.set(field, value);
        self.context.persistence.update(tx, update)?;
        debug!("Filled back {}.{} = {}", source.name, field, new_id);
        Ok(true)
    }
}

fn check_targets(schema: &EntitySchema, mapping: &FieldMapping) -> TransformResult<()> {
    for target in mapping.targets() {
        if !schema.has_field(target) {
            return Err(TransformError::SchemaResolution(format!(
                "Mapped target field {}.{} does not exist",
                schema.name, target
            )));
        }
    }
    Ok(())
}
