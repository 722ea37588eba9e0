//! Synchronization of parameter sets.
//!
//! Two relationships are kept in sync, both on the caller's schedule:
//!
//! * target refresh: `Main` is copied into the frozen `Target` set of the same model;
//! * global broadcast: the learner publishes its parameters into a
//!   [`GlobalParameters`] store and every actor pulls them into its local model.
//!
//! A published snapshot is immutable and swapped in as a whole, so a reader
//! never sees tensors from two different publications.
use crate::{ApexError, ParameterSet, QModel, Role};
use log::{debug, info};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, RwLock,
};

/// Parameters published by the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSnapshot {
    /// Number of optimization steps of the learner at publication.
    pub version: usize,

    /// Main parameters.
    pub main: ParameterSet,

    /// Target parameters.
    pub target: ParameterSet,
}

/// Store of the centrally trained parameters, shared by the learner and the actors.
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct GlobalParameters {
    snapshot: Arc<RwLock<Option<Arc<GlobalSnapshot>>>>,
    n_published: Arc<AtomicUsize>,
}

impl GlobalParameters {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published snapshot.
    pub fn publish(&self, snapshot: GlobalSnapshot) -> Result<(), ApexError> {
        let snapshot = Arc::new(snapshot);
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| ApexError::LockPoisoned("global parameters"))?;
        *guard = Some(snapshot);
        self.n_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// The latest snapshot, if any was published.
    pub fn snapshot(&self) -> Result<Option<Arc<GlobalSnapshot>>, ApexError> {
        let guard = self
            .snapshot
            .read()
            .map_err(|_| ApexError::LockPoisoned("global parameters"))?;
        Ok(guard.clone())
    }

    /// Version of the latest snapshot.
    pub fn version(&self) -> Result<Option<usize>, ApexError> {
        Ok(self.snapshot()?.map(|s| s.version))
    }

    /// Number of publications so far.
    pub fn n_published(&self) -> usize {
        self.n_published.load(Ordering::Relaxed)
    }
}

/// Copies parameters between the `Main`, `Target` and `Global` roles.
#[derive(Debug, Clone)]
pub struct SyncController {
    global: GlobalParameters,
}

impl SyncController {
    /// Creates a controller bound to a global store.
    pub fn new(global: GlobalParameters) -> Self {
        Self { global }
    }

    /// The global store.
    pub fn global(&self) -> &GlobalParameters {
        &self.global
    }

    /// Copies the parameters of role `from` into role `to`.
    ///
    /// Supported copies are `Main -> Target`, `Main -> Global` and
    /// `Global -> Main`. A `Main -> Global` copy is published one version past
    /// the latest snapshot; use [`SyncController::publish_global`] to tag it
    /// explicitly. Returns `false` if a `Global -> Main` copy found nothing
    /// published.
    pub fn copy<M: QModel + ?Sized>(
        &self,
        model: &mut M,
        from: Role,
        to: Role,
    ) -> Result<bool, ApexError> {
        match (from, to) {
            (Role::Main, Role::Target) => {
                model.copy_parameters(Role::Main, Role::Target)?;
                Ok(true)
            }
            (Role::Main, Role::Global) => {
                let version = self.global.version()?.map_or(0, |v| v + 1);
                self.publish_snapshot(model, version)?;
                Ok(true)
            }
            (Role::Global, Role::Main) => match self.global.snapshot()? {
                Some(snapshot) => {
                    Self::load_snapshot(model, &snapshot)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            (from, to) => Err(ApexError::InvalidSync {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    fn publish_snapshot<M: QModel + ?Sized>(
        &self,
        model: &M,
        version: usize,
    ) -> Result<(), ApexError> {
        let snapshot = GlobalSnapshot {
            version,
            main: model.parameters(Role::Main)?,
            target: model.parameters(Role::Target)?,
        };
        self.global.publish(snapshot)
    }

    /// Loads both sets of a snapshot. If the target set fails to load, the
    /// previous main set is restored, so the model is left as it was.
    fn load_snapshot<M: QModel + ?Sized>(
        model: &mut M,
        snapshot: &GlobalSnapshot,
    ) -> Result<(), ApexError> {
        let previous = model.parameters(Role::Main)?;
        model.load_parameters(Role::Main, &snapshot.main)?;
        if let Err(e) = model.load_parameters(Role::Target, &snapshot.target) {
            model.load_parameters(Role::Main, &previous)?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Copies every main tensor into the target set.
    pub fn refresh_target<M: QModel + ?Sized>(&self, model: &mut M) -> Result<(), ApexError> {
        self.copy(model, Role::Main, Role::Target)?;
        debug!("Refreshed target parameters");
        Ok(())
    }

    /// Publishes the learner's parameters for the actors, tagged with
    /// `version`.
    pub fn publish_global<M: QModel + ?Sized>(
        &self,
        model: &M,
        version: usize,
    ) -> Result<(), ApexError> {
        self.publish_snapshot(model, version)?;
        info!("Published global parameters at {} optimization steps", version);
        Ok(())
    }

    /// Loads the published parameters into a local model if they are newer
    /// than `current`. Returns the version now held by the model.
    ///
    /// On error the local parameters are unchanged.
    pub fn pull_global<M: QModel + ?Sized>(
        &self,
        model: &mut M,
        current: Option<usize>,
    ) -> Result<Option<usize>, ApexError> {
        let snapshot = match self.global.snapshot()? {
            Some(snapshot) => snapshot,
            None => return Ok(current),
        };
        if current.map_or(false, |v| v >= snapshot.version) {
            return Ok(current);
        }
        Self::load_snapshot(model, &snapshot)?;
        debug!("Pulled global parameters of version {}", snapshot.version);
        Ok(Some(snapshot.version))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{model::LinearQModel, ExecContext};
    use ndarray::ArrayD;

    fn q(model: &LinearQModel, role: Role) -> Vec<f32> {
        let s = ArrayD::from_elem(vec![3], 1.0f32);
        let mut ctx = ExecContext::inference();
        model
            .forward(&mut ctx, role, &[s.view()], &[0])
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn test_refresh_target() {
        let mut model = LinearQModel::new(3, 2, 1);
        let sync = SyncController::new(GlobalParameters::new());
        let mut p = model.parameters(Role::Main).unwrap();
        let zeros = p.clone();
        p.insert("w", ArrayD::from_elem(vec![2, 5], 0.5));
        p.insert("b", ArrayD::from_elem(vec![2], 0.1));
        assert_eq!(zeros.len(), p.len());
        model.load_parameters(Role::Main, &p).unwrap();
        assert_ne!(q(&model, Role::Main), q(&model, Role::Target));

        sync.refresh_target(&mut model).unwrap();
        assert_eq!(q(&model, Role::Main), q(&model, Role::Target));
        assert_eq!(
            model.parameters(Role::Target).unwrap(),
            model.parameters(Role::Main).unwrap()
        );
    }

    #[test]
    fn test_publish_and_pull() {
        let global = GlobalParameters::new();
        let learner_sync = SyncController::new(global.clone());
        let actor_sync = SyncController::new(global.clone());

        let learner = LinearQModel::new(3, 2, 1);
        let mut actor = LinearQModel::new(3, 2, 2);
        assert_ne!(q(&learner, Role::Main), q(&actor, Role::Main));

        // Nothing published yet.
        assert_eq!(actor_sync.pull_global(&mut actor, None).unwrap(), None);

        learner_sync.publish_global(&learner, 10).unwrap();
        assert_eq!(global.version().unwrap(), Some(10));
        assert_eq!(actor_sync.pull_global(&mut actor, None).unwrap(), Some(10));
        assert_eq!(q(&learner, Role::Main), q(&actor, Role::Main));
        assert_eq!(q(&learner, Role::Target), q(&actor, Role::Target));

        // Same version is not pulled twice.
        assert_eq!(actor_sync.pull_global(&mut actor, Some(10)).unwrap(), Some(10));
        assert_eq!(global.n_published(), 1);
    }

    #[test]
    fn test_invalid_copy() {
        let mut model = LinearQModel::new(3, 2, 1);
        let sync = SyncController::new(GlobalParameters::new());
        assert!(matches!(
            sync.copy(&mut model, Role::Target, Role::Main),
            Err(ApexError::InvalidSync { .. })
        ));
        assert!(!sync.copy(&mut model, Role::Global, Role::Main).unwrap());
    }

    #[test]
    fn test_copy_to_global_advances_version() {
        let global = GlobalParameters::new();
        let sync = SyncController::new(global.clone());
        let mut model = LinearQModel::new(3, 2, 1);

        assert!(sync.copy(&mut model, Role::Main, Role::Global).unwrap());
        assert_eq!(global.version().unwrap(), Some(0));
        sync.publish_global(&model, 7).unwrap();
        assert!(sync.copy(&mut model, Role::Main, Role::Global).unwrap());
        assert_eq!(global.version().unwrap(), Some(8));
        assert_eq!(global.n_published(), 3);
    }

    #[test]
    fn test_failed_pull_leaves_model_unchanged() {
        let global = GlobalParameters::new();
        let sync = SyncController::new(global.clone());
        let mut actor = LinearQModel::new(3, 2, 2);
        let main_before = actor.parameters(Role::Main).unwrap();
        let target_before = actor.parameters(Role::Target).unwrap();

        // Main set fits the model, target set does not.
        let main = LinearQModel::new(3, 2, 1).parameters(Role::Main).unwrap();
        let mut target = ParameterSet::new();
        target.insert("w", ArrayD::zeros(vec![2, 4]));
        target.insert("b", ArrayD::zeros(vec![2]));
        global
            .publish(GlobalSnapshot {
                version: 5,
                main,
                target,
            })
            .unwrap();

        assert!(matches!(
            sync.pull_global(&mut actor, None),
            Err(ApexError::Model(_))
        ));
        assert!(sync.copy(&mut actor, Role::Global, Role::Main).is_err());
        assert_eq!(actor.parameters(Role::Main).unwrap(), main_before);
        assert_eq!(actor.parameters(Role::Target).unwrap(), target_before);
    }

    #[test]
    fn test_snapshot_is_consistent_under_concurrent_publication() {
        let global = GlobalParameters::new();
        let writer = {
            let global = global.clone();
            std::thread::spawn(move || {
                for v in 0..200usize {
                    let mut p = ParameterSet::new();
                    p.insert("a", ArrayD::from_elem(vec![16], v as f32));
                    p.insert("b", ArrayD::from_elem(vec![16], v as f32));
                    global
                        .publish(GlobalSnapshot {
                            version: v,
                            main: p.clone(),
                            target: p,
                        })
                        .unwrap();
                }
            })
        };
        for _ in 0..200 {
            if let Some(s) = global.snapshot().unwrap() {
                let v = s.version as f32;
                for (_, t) in s.main.iter().chain(s.target.iter()) {
                    assert!(t.iter().all(|x| *x == v));
                }
            }
        }
        writer.join().unwrap();
    }
}
