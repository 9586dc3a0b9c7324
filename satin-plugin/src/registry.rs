//! Plugin registry and lifecycle.
//!
//! ```text
//! registered --validate--> validated | failed
//! validated --initialize--> active | failed
//! active --deactivate--> deactivated
//! ```
//!
//! Membership lives behind one `RwLock`; each plugin has its own `Mutex` for
//! lifecycle transitions, so unrelated plugins activate in parallel. The map
//! lock is never held while plugin code runs.

use indexmap::IndexMap;
use satin_config::{SatinSettings, SchemaRegistry, Validator};
use satin_core::{Result, SatinError};
use satin_logging::Logger;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::instrument;

use crate::discovery::discover_plugins;
use crate::host::{PluginHandle, PluginHost};
use crate::types::{HookReport, PluginDescriptor, PluginState};

struct SlotState {
    descriptor: PluginDescriptor,
    handle: Option<Arc<dyn PluginHandle>>,
}

struct PluginSlot {
    state: Mutex<SlotState>,
}

impl PluginSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn invalid_state(slot: &SlotState, operation: &'static str) -> SatinError {
    SatinError::InvalidState {
        id: slot.descriptor.id.clone(),
        state: slot.descriptor.state.to_string(),
        operation,
    }
}

pub struct PluginRegistry {
    plugins: RwLock<IndexMap<String, Arc<PluginSlot>>>,
    schemas: Arc<SchemaRegistry>,
    validator: Validator,
    host: Arc<dyn PluginHost>,
    logger: Arc<dyn Logger>,
}

impl PluginRegistry {
    pub fn new(
        schemas: Arc<SchemaRegistry>,
        host: Arc<dyn PluginHost>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            plugins: RwLock::new(IndexMap::new()),
            schemas,
            validator: Validator::new(Arc::clone(&logger)),
            host,
            logger,
        }
    }

    /// Replace the validator used for plugin configs (e.g. to enable strict
    /// mode).
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    fn slot(&self, id: &str) -> Result<Arc<PluginSlot>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| SatinError::PluginNotFound { id: id.to_string() })
    }

    /// Slots in registration order, without holding the map lock afterwards.
    fn snapshot(&self) -> Vec<Arc<PluginSlot>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Add a plugin in the `registered` state.
    pub fn register(&self, descriptor: PluginDescriptor) -> Result<()> {
        let mut descriptor = descriptor;
        descriptor.state = PluginState::Registered;
        descriptor.last_error = None;

        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.contains_key(&descriptor.id) {
            self.logger
                .warn(&format!("Plugin '{}' is already registered", descriptor.id));
            return Err(SatinError::DuplicatePlugin { id: descriptor.id });
        }

        self.logger.info(&format!(
            "Registered plugin '{}' v{}",
            descriptor.id, descriptor.version
        ));
        plugins.insert(
            descriptor.id.clone(),
            Arc::new(PluginSlot {
                state: Mutex::new(SlotState {
                    descriptor,
                    handle: None,
                }),
            }),
        );
        Ok(())
    }

    /// Register every plugin found under `dir`. Ids that are already taken
    /// are skipped with a warning. Returns the newly registered ids.
    pub fn register_discovered(&self, dir: &Path) -> Result<Vec<String>> {
        let manifests = discover_plugins(dir, self.logger.as_ref())?;

        let mut registered = Vec::new();
        for manifest in manifests {
            let id = manifest.id.clone();
            match self.register(manifest.into()) {
                Ok(()) => registered.push(id),
                Err(SatinError::DuplicatePlugin { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(registered)
    }

    /// Register the plugins under the directory named by `plugins.path`.
    pub fn register_configured(&self, settings: &SatinSettings) -> Result<Vec<String>> {
        let dir = settings.plugins_dir();
        self.logger
            .debug(&format!("Discovering plugins in {}", dir.display()));
        self.register_discovered(&dir)
    }

    /// Check a registered plugin's config against its declared schema.
    #[instrument(skip(self))]
    pub fn validate(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let mut state = slot.lock();
        if state.descriptor.state != PluginState::Registered {
            return Err(invalid_state(&state, "validate"));
        }
        self.validate_locked(&mut state)
    }

    fn validate_locked(&self, state: &mut SlotState) -> Result<()> {
        let checked = match &state.descriptor.schema {
            None => Ok(()),
            Some(schema_name) => self
                .validator
                .validate_named(&self.schemas, schema_name, &state.descriptor.config)
                .and_then(|result| {
                    if result.is_valid() {
                        Ok(())
                    } else {
                        Err(SatinError::ValidationFailed {
                            subject: format!("plugin '{}'", state.descriptor.id),
                            result,
                        })
                    }
                }),
        };

        match checked {
            Ok(()) => {
                state.descriptor.state = PluginState::Validated;
                self.logger
                    .debug(&format!("Plugin '{}' validated", state.descriptor.id));
                Ok(())
            }
            Err(e) => Err(self.fail(state, e)),
        }
    }

    fn fail(&self, state: &mut SlotState, error: SatinError) -> SatinError {
        state.descriptor.state = PluginState::Failed;
        state.descriptor.last_error = Some(error.to_string());
        self.logger.error(&format!(
            "Plugin '{}' failed: {}",
            state.descriptor.id, error
        ));
        error
    }

    /// Validate (if needed), resolve and initialize a plugin.
    #[instrument(skip(self))]
    pub fn activate(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let mut state = slot.lock();

        match state.descriptor.state {
            PluginState::Registered => self.validate_locked(&mut state)?,
            PluginState::Validated => {}
            _ => return Err(invalid_state(&state, "activate")),
        }

        let handle = match self.host.resolve(&state.descriptor.entry) {
            Ok(handle) => handle,
            Err(e) => {
                let error = SatinError::PluginInit {
                    id: id.to_string(),
                    reason: format!("{e:#}"),
                };
                return Err(self.fail(&mut state, error));
            }
        };

        if let Err(e) = handle.initialize(&state.descriptor.config) {
            let error = SatinError::PluginInit {
                id: id.to_string(),
                reason: format!("{e:#}"),
            };
            return Err(self.fail(&mut state, error));
        }

        state.descriptor.state = PluginState::Active;
        state.descriptor.last_error = None;
        state.handle = Some(handle);
        self.logger.info(&format!("Activated plugin '{}'", id));
        Ok(())
    }

    /// Shut an active plugin down. A failing shutdown is recorded but the
    /// plugin still ends up deactivated.
    #[instrument(skip(self))]
    pub fn deactivate(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let mut state = slot.lock();
        self.deactivate_locked(&mut state)
    }

    fn deactivate_locked(&self, state: &mut SlotState) -> Result<()> {
        if state.descriptor.state != PluginState::Active {
            return Err(invalid_state(state, "deactivate"));
        }

        if let Some(handle) = state.handle.take() {
            if let Err(e) = handle.shutdown() {
                let message = format!("shutdown failed: {e:#}");
                self.logger.error(&format!(
                    "Plugin '{}' {}",
                    state.descriptor.id, message
                ));
                state.descriptor.last_error = Some(message);
            }
        }

        state.descriptor.state = PluginState::Deactivated;
        self.logger
            .info(&format!("Deactivated plugin '{}'", state.descriptor.id));
        Ok(())
    }

    /// Deactivate every active plugin, newest registration first. Returns the
    /// ids in the order they were shut down.
    pub fn deactivate_all(&self) -> Vec<String> {
        let mut stopped = Vec::new();
        for slot in self.snapshot().into_iter().rev() {
            let mut state = slot.lock();
            if state.descriptor.state == PluginState::Active
                && self.deactivate_locked(&mut state).is_ok()
            {
                stopped.push(state.descriptor.id.clone());
            }
        }
        stopped
    }

    /// Call `hook` on every active plugin in registration order. Failures are
    /// logged and collected; they never stop the remaining plugins.
    pub fn run_hook(&self, hook: &str, payload: &Value) -> HookReport {
        let mut report = HookReport {
            hook: hook.to_string(),
            ..HookReport::default()
        };

        for slot in self.snapshot() {
            let state = slot.lock();
            let (PluginState::Active, Some(handle)) = (state.descriptor.state, &state.handle)
            else {
                continue;
            };
            let id = state.descriptor.id.clone();
            match handle.on_hook(hook, payload) {
                Ok(()) => report.succeeded.push(id),
                Err(e) => {
                    let message = format!("{e:#}");
                    self.logger.warn(&format!(
                        "Plugin '{}' failed hook '{}': {}",
                        id, hook, message
                    ));
                    report.failed.push((id, message));
                }
            }
        }
        report
    }

    pub fn get(&self, id: &str) -> Result<PluginDescriptor> {
        Ok(self.slot(id)?.lock().descriptor.clone())
    }

    /// Every plugin in registration order.
    pub fn list(&self) -> Vec<PluginDescriptor> {
        self.snapshot()
            .iter()
            .map(|slot| slot.lock().descriptor.clone())
            .collect()
    }

    /// Active plugins in registration order.
    pub fn active_list(&self) -> Vec<PluginDescriptor> {
        self.snapshot()
            .iter()
            .filter_map(|slot| {
                let state = slot.lock();
                state.descriptor.is_active().then(|| state.descriptor.clone())
            })
            .collect()
    }

    /// Remove a plugin that is not active.
    pub fn unregister(&self, id: &str) -> Result<PluginDescriptor> {
        let slot = self.slot(id)?;
        let state = slot.lock();
        if state.descriptor.is_active() {
            return Err(invalid_state(&state, "unregister"));
        }

        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        match plugins.get(id) {
            Some(current) if Arc::ptr_eq(current, &slot) => {
                plugins.shift_remove(id);
            }
            _ => return Err(SatinError::PluginNotFound { id: id.to_string() }),
        }
        self.logger.info(&format!("Unregistered plugin '{}'", id));
        Ok(state.descriptor.clone())
    }
}
