//! Compiled programs keyed by rule id, with a secondary name index.
//!
//! Lookups that hit never block on compilation. A miss takes a per-id flight
//! lock, so concurrent misses for one id compile it once. Every invalidation
//! bumps the id's generation; a compile that started under an older generation
//! is discarded and rebuilt instead of being cached. Generations are only kept
//! for ids with a compile in flight, so the map does not grow with deleted ids.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::RuleError;
use crate::store::{RuleId, RuleStore};

struct CacheState<P> {
    programs: HashMap<RuleId, Arc<P>>,
    names: HashMap<String, RuleId>,
    generations: HashMap<RuleId, u64>,
    /// Bumped by every invalidation; guards name-index inserts.
    epoch: u64,
}

impl<P> Default for CacheState<P> {
    fn default() -> Self {
        Self {
            programs: HashMap::new(),
            names: HashMap::new(),
            generations: HashMap::new(),
            epoch: 0,
        }
    }
}

impl<P> CacheState<P> {
    fn generation(&self, id: RuleId) -> u64 {
        self.generations.get(&id).copied().unwrap_or(0)
    }
}

/// Get-or-compile cache of rule programs.
pub struct ProgramCache<E: Engine> {
    engine: Arc<E>,
    store: Arc<dyn RuleStore>,
    state: RwLock<CacheState<E::Program>>,
    flights: Mutex<HashMap<RuleId, Arc<Mutex<()>>>>,
}

impl<E: Engine> ProgramCache<E> {
    pub fn new(engine: Arc<E>, store: Arc<dyn RuleStore>) -> Self {
        Self {
            engine,
            store,
            state: RwLock::new(CacheState::default()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// The program for `id`, compiling the stored source on a miss.
    ///
    /// # Errors
    ///
    /// - [`RuleError::NotFound`] if the store has no rule `id` or its source is blank.
    /// - [`RuleError::Compile`] if the engine rejects the source.
    /// - [`RuleError::Store`] if the store fails.
    pub fn get_by_id(&self, id: RuleId) -> Result<Arc<E::Program>, RuleError> {
        if let Some(program) = self.state.read().programs.get(&id) {
            return Ok(Arc::clone(program));
        }

        let flight = self.flight(id);
        let outcome = {
            let _guard = flight.lock();
            self.build(id)
        };
        self.land(id, flight);
        outcome
    }

    /// The program for the rule called `name`.
    ///
    /// # Errors
    ///
    /// Same as [`get_by_id`](Self::get_by_id); [`RuleError::NotFound`] if no
    /// rule has that name.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<E::Program>, RuleError> {
        let cached = self.state.read().names.get(name).copied();
        let id = match cached {
            Some(id) => id,
            None => self.resolve_name(name)?,
        };
        self.get_by_id(id)
    }

    /// Drop the program for `id` and every name mapped to it.
    pub fn invalidate(&self, id: RuleId) {
        let mut state = self.state.write();
        let removed = state.programs.remove(&id).is_some();
        if self.flights.lock().contains_key(&id) {
            *state.generations.entry(id).or_insert(0) += 1;
        } else {
            state.generations.remove(&id);
        }
        state.epoch += 1;
        state.names.retain(|_, mapped| *mapped != id);
        drop(state);
        info!(rule_id = %id, removed, "invalidated rule program");
    }

    #[must_use]
    pub fn contains(&self, id: RuleId) -> bool {
        self.state.read().programs.contains_key(&id)
    }

    /// Id the name index currently maps `name` to.
    #[must_use]
    pub fn cached_id(&self, name: &str) -> Option<RuleId> {
        self.state.read().names.get(name).copied()
    }

    /// Number of cached programs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flight(&self, id: RuleId) -> Arc<Mutex<()>> {
        Arc::clone(self.flights.lock().entry(id).or_default())
    }

    /// Release a flight lock handle, forgetting the lock once no other caller holds it.
    fn land(&self, id: RuleId, flight: Arc<Mutex<()>>) {
        let mut flights = self.flights.lock();
        let last = Arc::strong_count(&flight) == 2
            && flights
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, &flight));
        drop(flight);
        if last {
            flights.remove(&id);
        }
    }

    /// Runs under the flight lock for `id`.
    fn build(&self, id: RuleId) -> Result<Arc<E::Program>, RuleError> {
        loop {
            let generation = {
                let state = self.state.read();
                if let Some(program) = state.programs.get(&id) {
                    debug!(rule_id = %id, "program compiled by another caller");
                    return Ok(Arc::clone(program));
                }
                state.generation(id)
            };

            let program = Arc::new(self.compile(id)?);

            let mut state = self.state.write();
            if state.generation(id) == generation {
                state.programs.insert(id, Arc::clone(&program));
                return Ok(program);
            }
            drop(state);
            warn!(rule_id = %id, "rule changed while compiling, rebuilding");
        }
    }

    fn compile(&self, id: RuleId) -> Result<E::Program, RuleError> {
        let rule = self
            .store
            .find_by_id(id)?
            .filter(|rule| !rule.source.trim().is_empty())
            .ok_or_else(|| RuleError::NotFound(id.into()))?;

        let program = self
            .engine
            .compile(&rule.source)
            .map_err(|diagnostics| RuleError::Compile { id, diagnostics })?;

        debug!(
            rule_id = %id,
            rule = %rule.name,
            digest = %blake3::hash(rule.source.as_bytes()),
            "compiled rule program"
        );
        Ok(program)
    }

    fn resolve_name(&self, name: &str) -> Result<RuleId, RuleError> {
        let epoch = self.state.read().epoch;
        let id = self
            .store
            .find_by_name(name)?
            .and_then(|rule| rule.id)
            .ok_or_else(|| RuleError::NotFound(name.into()))?;

        let mut state = self.state.write();
        if state.epoch == epoch {
            state.names.entry(name.to_owned()).or_insert(id);
        }
        Ok(id)
    }
}

impl<E: Engine> std::fmt::Debug for ProgramCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ProgramCache")
            .field("programs", &state.programs.len())
            .field("names", &state.names.len())
            .field("epoch", &state.epoch)
            .finish_non_exhaustive()
    }
}
