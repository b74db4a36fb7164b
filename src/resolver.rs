//! Resolution of vendor-specific bulk data adapters.
//!
//! Strategies are tried in a fixed order and the first match wins:
//!
//! 1. [`ResolutionStrategy::BuiltIn`]: the connection is one of this crate's
//!    drivers, matched by exact type.
//! 2. [`ResolutionStrategy::Capability`]: the connection implements
//!    [`AdapterFactory`](crate::traits::AdapterFactory).
//! 3. [`ResolutionStrategy::RegisteredHook`]: a [`ProviderFactory`] was
//!    registered for the connection's type.
//!
//! Drivers matching none of these are rejected with
//! [`DbExecError::UnsupportedDriver`]. Inspecting a driver's private
//! internals is not supported; unknown drivers register a hook instead.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::drivers::{InMemoryConnection, PostgresConnection};
use crate::error::{DbExecError, Result};
use crate::traits::{AdapterCommands, Connection, DataAdapter, ProviderFactory};

/// Which step of the resolution chain produced an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    BuiltIn,
    Capability,
    RegisteredHook,
}

/// A data adapter that only carries its command slots.
/// Used by the built-in drivers, whose adapters need no extra state.
pub struct CommandSetAdapter {
    driver_name: &'static str,
    commands: AdapterCommands,
}

impl CommandSetAdapter {
    pub fn new(driver_name: &'static str) -> Self {
        Self {
            driver_name,
            commands: AdapterCommands::default(),
        }
    }
}

impl DataAdapter for CommandSetAdapter {
    fn driver_name(&self) -> &str {
        self.driver_name
    }

    fn commands(&self) -> &AdapterCommands {
        &self.commands
    }

    fn commands_mut(&mut self) -> &mut AdapterCommands {
        &mut self.commands
    }
}

type AdapterConstructor = fn() -> Box<dyn DataAdapter>;

fn in_memory_adapter() -> Box<dyn DataAdapter> {
    Box::new(CommandSetAdapter::new("in-memory"))
}

fn postgres_adapter() -> Box<dyn DataAdapter> {
    Box::new(CommandSetAdapter::new("postgres"))
}

/// Picks the data adapter implementation for a connection.
///
/// # Example
/// ```
/// use dbexec::drivers::InMemoryConnection;
/// use dbexec::resolver::AdapterResolver;
/// use dbexec::traits::{AdapterCommands, DataAdapter};
///
/// let resolver = AdapterResolver::new();
/// let connection = InMemoryConnection::new();
/// let adapter = resolver
///     .resolve(Some(&connection), AdapterCommands::new())
///     .unwrap();
/// assert_eq!(adapter.driver_name(), "in-memory");
/// ```
pub struct AdapterResolver {
    built_ins: Vec<(TypeId, AdapterConstructor)>,
    hooks: HashMap<TypeId, Arc<dyn ProviderFactory>>,
    hook_lookups: AtomicUsize,
}

impl AdapterResolver {
    pub fn new() -> Self {
        Self {
            built_ins: vec![
                (TypeId::of::<InMemoryConnection>(), in_memory_adapter as AdapterConstructor),
                (TypeId::of::<PostgresConnection>(), postgres_adapter as AdapterConstructor),
            ],
            hooks: HashMap::new(),
            hook_lookups: AtomicUsize::new(0),
        }
    }

    /// Register the provider factory for connections of type `C`.
    /// A later registration for the same type replaces the earlier one.
    pub fn register<C: Connection + 'static>(
        &mut self,
        factory: Arc<dyn ProviderFactory>,
    ) -> &mut Self {
        self.hooks.insert(TypeId::of::<C>(), factory);
        self
    }

    /// Number of times the registered hook table has been consulted.
    pub fn hook_lookups(&self) -> usize {
        self.hook_lookups.load(Ordering::Relaxed)
    }

    /// Resolve an adapter for `connection` and attach `commands` to its slots.
    /// The adapter is returned without being executed.
    pub fn resolve(
        &self,
        connection: Option<&dyn Connection>,
        commands: AdapterCommands,
    ) -> Result<Box<dyn DataAdapter>> {
        let connection = connection.ok_or_else(|| {
            DbExecError::invalid_argument("connection", "The connection cannot be null")
        })?;
        let (mut adapter, strategy) = self.create(connection)?;
        debug!(
            driver = connection.type_name(),
            adapter = adapter.driver_name(),
            ?strategy,
            "resolved data adapter"
        );
        *adapter.commands_mut() = commands;
        Ok(adapter)
    }

    /// Run the resolution chain and report which strategy matched.
    pub fn create(
        &self,
        connection: &dyn Connection,
    ) -> Result<(Box<dyn DataAdapter>, ResolutionStrategy)> {
        let type_id = connection.as_any().type_id();

        if let Some((_, construct)) = self.built_ins.iter().find(|(id, _)| *id == type_id) {
            return Ok((construct(), ResolutionStrategy::BuiltIn));
        }

        if let Some(factory) = connection.adapter_factory() {
            return Ok((factory.create_data_adapter(), ResolutionStrategy::Capability));
        }

        self.hook_lookups.fetch_add(1, Ordering::Relaxed);
        if let Some(factory) = self.hooks.get(&type_id) {
            return Ok((factory.create_data_adapter(), ResolutionStrategy::RegisteredHook));
        }

        Err(DbExecError::UnsupportedDriver {
            type_name: connection.type_name().to_string(),
        })
    }
}

impl Default for AdapterResolver {
    fn default() -> Self {
        Self::new()
    }
}
