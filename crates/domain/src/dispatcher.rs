//! Routes wire commands to the handler registered for their type.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{Command, CommandEnvelope, CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::registry::{Registry, RegistryError};

#[async_trait]
trait DispatchTarget: Send + Sync {
    async fn dispatch(&self, envelope: CommandEnvelope) -> Result<CommandResult, DomainError>;
}

/// Binds a handler to the command enum selected at registration.
struct Typed<S, C: Command> {
    handler: Arc<CommandHandler<S, C::Aggregate>>,
    _command: PhantomData<fn() -> C>,
}

#[async_trait]
impl<S, C> DispatchTarget for Typed<S, C>
where
    S: EventStore + 'static,
    C: Command,
{
    async fn dispatch(&self, envelope: CommandEnvelope) -> Result<CommandResult, DomainError> {
        self.handler.handle_envelope::<C>(envelope).await
    }
}

/// Command registry with a `new → register* → freeze → dispatch` lifecycle.
///
/// Routes are keyed `{aggregateType}.{commandType}`, so two aggregates may
/// both accept e.g. `Delete`.
pub struct CommandDispatcher {
    targets: Registry<Arc<dyn DispatchTarget>>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            targets: Registry::new("command"),
        }
    }

    /// Registers `handler` under every tag of `C`.
    ///
    /// Either all of `C::COMMAND_TYPES` are registered or none are.
    pub fn register<S, C>(
        &mut self,
        handler: Arc<CommandHandler<S, C::Aggregate>>,
    ) -> Result<(), RegistryError>
    where
        S: EventStore + 'static,
        C: Command,
    {
        let aggregate_type = C::Aggregate::aggregate_type();
        let routes: Vec<String> = C::COMMAND_TYPES
            .iter()
            .map(|command_type| route(aggregate_type, command_type))
            .collect();
        if let Some(taken) = routes.iter().find(|key| self.targets.contains(key)) {
            return Err(RegistryError::Duplicate {
                category: "command",
                key: taken.clone(),
            });
        }

        let target: Arc<dyn DispatchTarget> = Arc::new(Typed::<S, C> {
            handler,
            _command: PhantomData,
        });
        for key in routes {
            self.targets.register(key, Arc::clone(&target))?;
        }

        tracing::debug!(
            aggregate_type,
            command_types = ?C::COMMAND_TYPES,
            "command handler registered"
        );
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.targets.freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.targets.is_frozen()
    }

    /// Registered `{aggregateType}.{commandType}` routes, sorted.
    pub fn supported_command_types(&self) -> Vec<&str> {
        self.targets.keys()
    }

    /// Dispatches and folds any error into a failed [`CommandResult`].
    pub async fn dispatch(&self, envelope: CommandEnvelope) -> CommandResult {
        let aggregate_id = envelope.aggregate_id;
        match self.try_dispatch(envelope).await {
            Ok(result) => result,
            Err(e) => CommandResult::failed(aggregate_id, &e),
        }
    }

    pub async fn try_dispatch(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<CommandResult, DomainError> {
        let key = route(&envelope.aggregate_type, &envelope.command_type);
        let target = match self.targets.get(&key) {
            Ok(target) => Arc::clone(target),
            Err(e) => {
                let e = DomainError::from(e);
                metrics::counter!("commands_failed_total", "kind" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(route = %key, error = %e, "command not dispatched");
                return Err(e);
            }
        };
        target.dispatch(envelope).await
    }
}

fn route(aggregate_type: &str, command_type: &str) -> String {
    format!("{aggregate_type}.{command_type}")
}
