//! Hook manager: registration and ordered execution of hooks.

use super::{Hook, HookId};
use crate::cancellation::StepContext;
use crate::core::HookPhase;
use crate::errors::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Clone)]
struct RegisteredHook {
    id: HookId,
    hook: Hook,
}

/// Registry of hooks keyed by step name and phase.
///
/// Hooks for one (step, phase) run in registration order. Callbacks always
/// run on a snapshot taken under the read lock, so registrations may
/// proceed while hooks execute.
#[derive(Default)]
pub struct HookManager {
    hooks: RwLock<HashMap<String, HashMap<HookPhase, Vec<RegisteredHook>>>>,
}

impl HookManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook to the (step, phase) list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty step name.
    pub fn register_hook(
        &self,
        step_name: &str,
        phase: HookPhase,
        hook: Hook,
    ) -> EngineResult<HookId> {
        if step_name.trim().is_empty() {
            return Err(EngineError::invalid_argument("step name cannot be empty"));
        }

        let id = HookId::new();
        self.hooks
            .write()
            .entry(step_name.to_string())
            .or_default()
            .entry(phase)
            .or_default()
            .push(RegisteredHook { id, hook });
        debug!(step = %step_name, phase = %phase, hook_id = %id, "Registered hook");
        Ok(id)
    }

    /// Returns a copy of the hooks registered for (step, phase).
    #[must_use]
    pub fn get_hooks(&self, step_name: &str, phase: HookPhase) -> Vec<Hook> {
        self.hooks
            .read()
            .get(step_name)
            .and_then(|phases| phases.get(&phase))
            .map(|hooks| hooks.iter().map(|h| h.hook.clone()).collect())
            .unwrap_or_default()
    }

    /// Runs the hooks for (step, phase) in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns `HookFailed` naming the hook's index, the step and the phase.
    pub async fn execute_hooks(
        &self,
        ctx: &StepContext,
        step_name: &str,
        phase: HookPhase,
    ) -> EngineResult<()> {
        let hooks = self.get_hooks(step_name, phase);
        if hooks.is_empty() {
            return Ok(());
        }

        debug!(step = %step_name, phase = %phase, count = hooks.len(), "Executing hooks");
        for (ordinal, hook) in hooks.iter().enumerate() {
            hook.call(ctx.clone())
                .await
                .map_err(|err| EngineError::HookFailed {
                    ordinal,
                    step: step_name.to_string(),
                    phase,
                    message: format!("{err:#}"),
                })?;
        }
        Ok(())
    }

    /// Removes the first registration of `hook` for (step, phase).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if that callback is not registered there.
    pub fn remove_hook(&self, step_name: &str, phase: HookPhase, hook: &Hook) -> EngineResult<()> {
        self.remove_where(step_name, Some(phase), |registered| registered.hook.same_as(hook))
    }

    /// Removes the registration identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no registration has that id.
    pub fn remove_hook_by_id(&self, step_name: &str, id: HookId) -> EngineResult<()> {
        self.remove_where(step_name, None, |registered| registered.id == id)
    }

    /// Returns hook counts per step and phase.
    #[must_use]
    pub fn list_hooks(&self) -> BTreeMap<String, BTreeMap<HookPhase, usize>> {
        self.hooks
            .read()
            .iter()
            .map(|(step, phases)| {
                let counts = phases
                    .iter()
                    .filter(|(_, hooks)| !hooks.is_empty())
                    .map(|(phase, hooks)| (*phase, hooks.len()))
                    .collect::<BTreeMap<_, _>>();
                (step.clone(), counts)
            })
            .filter(|(_, counts)| !counts.is_empty())
            .collect()
    }

    /// Returns the total number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks
            .read()
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Removes every hook of one step.
    pub fn clear_hooks(&self, step_name: &str) {
        self.hooks.write().remove(step_name);
    }

    /// Removes every hook.
    pub fn clear_all_hooks(&self) {
        self.hooks.write().clear();
    }

    fn remove_where(
        &self,
        step_name: &str,
        phase: Option<HookPhase>,
        matches: impl Fn(&RegisteredHook) -> bool,
    ) -> EngineResult<()> {
        let mut hooks = self.hooks.write();
        let not_found = || EngineError::HookNotFound {
            step: step_name.to_string(),
            phase: phase.map_or_else(|| "any".to_string(), |p| p.to_string()),
        };
        let phases = hooks.get_mut(step_name).ok_or_else(not_found)?;

        for (candidate, list) in phases.iter_mut() {
            if phase.is_some_and(|p| p != *candidate) {
                continue;
            }
            if let Some(index) = list.iter().position(&matches) {
                let removed = list.remove(index);
                debug!(
                    step = %step_name,
                    phase = %candidate,
                    hook_id = %removed.id,
                    "Removed hook"
                );
                return Ok(());
            }
        }
        Err(not_found())
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("hook_count", &self.hook_count())
            .finish()
    }
}
