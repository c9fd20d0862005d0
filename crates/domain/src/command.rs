//! Command handling: the load → mutate → save → publish pipeline.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use common::{AggregateId, Issuer};
use event_store::{EventEnvelope, EventStore, Version};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::bus::EventBus;
use crate::error::{AggregateError, DomainError, ErrorBody, ErrorKind};
use crate::gate::CommitGate;
use crate::repository::EventSourcedRepository;

/// A typed command enum for one aggregate type.
///
/// Implementors are serde enums tagged `#[serde(tag = "type", content = "data")]`
/// whose variants all carry struct data (use `Delete {}` rather than a unit
/// variant), so a wire [`CommandEnvelope`] decodes straight into a variant.
pub trait Command: Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Every `type` tag this enum accepts.
    const COMMAND_TYPES: &'static [&'static str];

    /// Tag of this variant.
    fn command_type(&self) -> &'static str;

    /// Creation commands start from a fresh aggregate instead of loading one.
    fn is_creation(&self) -> bool {
        false
    }

    /// Structural checks that need no aggregate state.
    fn validate(&self) -> Result<(), DomainError> {
        Ok(())
    }

    /// Invokes the business method for this command on the root.
    fn execute(
        &self,
        root: &mut AggregateRoot<Self::Aggregate>,
    ) -> Result<(), AggregateError<<Self::Aggregate as Aggregate>::Error>>;
}

/// A command as received from a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_type: String,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub issuer_id: Option<String>,
}

impl CommandEnvelope {
    pub fn new(
        command_type: impl Into<String>,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            command_type: command_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            payload,
            issuer_id: None,
        }
    }

    /// Wraps a typed command for the wire.
    pub fn from_command<C: Command>(
        aggregate_id: AggregateId,
        command: &C,
    ) -> Result<Self, DomainError> {
        let mut value = serde_json::to_value(command)?;
        let payload = value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or_else(|| serde_json::json!({}));

        Ok(Self::new(
            command.command_type(),
            aggregate_id,
            C::Aggregate::aggregate_type(),
            payload,
        ))
    }

    pub fn with_issuer(mut self, issuer_id: impl Into<String>) -> Self {
        self.issuer_id = Some(issuer_id.into());
        self
    }

    /// A missing or blank issuer id means the system.
    pub fn issuer(&self) -> Issuer {
        Issuer::from_optional(self.issuer_id.clone())
    }

    /// Decodes the payload into the typed command `C`.
    ///
    /// Fails with a validation error if the envelope targets another
    /// aggregate type or the payload does not fit the variant.
    pub fn decode<C: Command>(&self) -> Result<C, DomainError> {
        let expected = C::Aggregate::aggregate_type();
        if self.aggregate_type != expected {
            return Err(DomainError::validation(format!(
                "{} targets {expected}, not {}",
                self.command_type, self.aggregate_type
            )));
        }

        let data = if self.payload.is_null() {
            serde_json::json!({})
        } else {
            self.payload.clone()
        };
        serde_json::from_value(serde_json::json!({
            "type": self.command_type,
            "data": data,
        }))
        .map_err(|e| DomainError::validation(format!("invalid {} payload: {e}", self.command_type)))
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub aggregate_id: AggregateId,
    /// Version after the command; unchanged if nothing was recorded.
    pub version: Version,
    /// Events committed by the command, in order.
    pub events: Vec<EventEnvelope>,
    /// Snapshot of the aggregate state after the command.
    pub data: serde_json::Value,
}

impl CommandResult {
    pub fn succeeded(
        aggregate_id: AggregateId,
        version: Version,
        events: Vec<EventEnvelope>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            success: true,
            error: None,
            aggregate_id,
            version,
            events,
            data,
        }
    }

    pub fn failed(aggregate_id: AggregateId, error: &DomainError) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            aggregate_id,
            version: Version::initial(),
            events: Vec::new(),
            data: serde_json::Value::Null,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Runs commands against aggregates of type `A`.
///
/// The handler is responsible for:
/// 1. Validating the command without touching storage
/// 2. Creating or loading the aggregate root
/// 3. Running the business method
/// 4. Saving with the loaded version as the expected version
/// 5. Publishing the committed events in order
///
/// Concurrency conflicts are returned to the caller; the handler never
/// retries.
pub struct CommandHandler<S, A> {
    repository: EventSourcedRepository<S, A>,
    bus: Arc<dyn EventBus>,
    gate: CommitGate,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S, bus: Arc<dyn EventBus>) -> Self {
        Self {
            repository: EventSourcedRepository::new(store),
            bus,
            gate: CommitGate::new(),
        }
    }

    pub fn repository(&self) -> &EventSourcedRepository<S, A> {
        &self.repository
    }

    /// Handles a typed command.
    pub async fn handle<C>(
        &self,
        aggregate_id: AggregateId,
        command: C,
        issuer: Issuer,
    ) -> Result<CommandResult, DomainError>
    where
        C: Command<Aggregate = A>,
    {
        let command_type = command.command_type();
        observe(
            command_type,
            self.execute(aggregate_id, &command, issuer),
        )
        .await
    }

    /// Decodes a wire envelope into `C` and handles it.
    pub async fn handle_envelope<C>(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<CommandResult, DomainError>
    where
        C: Command<Aggregate = A>,
    {
        let command_type = envelope.command_type.clone();
        observe(&command_type, async {
            let command: C = envelope.decode()?;
            self.execute(envelope.aggregate_id, &command, envelope.issuer())
                .await
        })
        .await
    }

    #[tracing::instrument(
        skip(self, command, issuer),
        fields(
            aggregate_type = A::aggregate_type(),
            command_type = command.command_type(),
            issuer = %issuer,
        )
    )]
    async fn execute<C>(
        &self,
        aggregate_id: AggregateId,
        command: &C,
        issuer: Issuer,
    ) -> Result<CommandResult, DomainError>
    where
        C: Command<Aggregate = A>,
    {
        command.validate()?;

        let mut root = if command.is_creation() {
            AggregateRoot::new(aggregate_id)
        } else {
            self.repository.get_by_id(aggregate_id).await?
        };
        root.set_issuer(issuer);

        command.execute(&mut root)?;
        root.validate()?;

        if !root.has_uncommitted_changes() {
            return Ok(CommandResult::succeeded(
                aggregate_id,
                root.current_version(),
                Vec::new(),
                serde_json::to_value(root.state())?,
            ));
        }

        let metadata = HashMap::from([(
            "command_type".to_string(),
            serde_json::Value::from(command.command_type()),
        )]);

        // Save and publish under one permit so this aggregate's events reach
        // the bus in commit order.
        let committed = {
            let _permit = self.gate.enter(aggregate_id).await;
            let expected = root.original_version();
            let committed = self
                .repository
                .save_with_metadata(&mut root, expected, &metadata)
                .await?;

            let report = self.bus.publish(&committed).await;
            metrics::counter!("events_published_total").increment(committed.len() as u64);
            for failure in &report.failures {
                tracing::warn!(
                    subscriber = %failure.subscriber,
                    event_type = %failure.event_type,
                    version = %failure.version,
                    error = %failure.error,
                    "event delivery failed"
                );
            }
            committed
        };

        Ok(CommandResult::succeeded(
            aggregate_id,
            root.current_version(),
            committed,
            serde_json::to_value(root.state())?,
        ))
    }
}

async fn observe<F>(command_type: &str, pipeline: F) -> Result<CommandResult, DomainError>
where
    F: Future<Output = Result<CommandResult, DomainError>>,
{
    let started = Instant::now();
    let result = pipeline.await;
    metrics::histogram!("command_duration_seconds").record(started.elapsed().as_secs_f64());

    match &result {
        Ok(outcome) => {
            metrics::counter!("commands_handled_total").increment(1);
            tracing::info!(
                command_type,
                aggregate_id = %outcome.aggregate_id,
                version = %outcome.version,
                events = outcome.events.len(),
                "command handled"
            );
        }
        Err(e) => {
            metrics::counter!("commands_failed_total", "kind" => e.kind().as_str()).increment(1);
            if e.is_conflict() {
                tracing::warn!(command_type, error = %e, "command lost a concurrent write");
            } else {
                tracing::info!(command_type, error = %e, kind = %e.kind(), "command rejected");
            }
        }
    }
    result
}
