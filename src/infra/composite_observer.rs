use crate::error::ActorError;
use crate::infra::{BodyId, Pose, SessionObserver};
use crate::orchestrator::{GroupTable, Observations};
use crate::world::ServerEndpoint;

pub struct CompositeObserver {
    observers: Vec<Box<dyn SessionObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Box<dyn SessionObserver>>) -> Self {
        Self { observers }
    }
}

impl SessionObserver for CompositeObserver {
    fn on_server_started(&mut self, endpoint: &ServerEndpoint) {
        for observer in &mut self.observers {
            observer.on_server_started(endpoint);
        }
    }

    fn on_actor_spawned(&mut self, group_id: &str, index: usize, actor_id: BodyId, pose: Pose) {
        for observer in &mut self.observers {
            observer.on_actor_spawned(group_id, index, actor_id, pose);
        }
    }

    fn on_experiment_configured(&mut self, groups: &GroupTable) {
        for observer in &mut self.observers {
            observer.on_experiment_configured(groups);
        }
    }

    fn on_reset(&mut self, observations: &Observations) {
        for observer in &mut self.observers {
            observer.on_reset(observations);
        }
    }

    fn on_tick(&mut self, tick: u64, observations: &Observations) {
        for observer in &mut self.observers {
            observer.on_tick(tick, observations);
        }
    }

    fn on_actor_fault(&mut self, group_id: &str, index: usize, error: &ActorError) {
        for observer in &mut self.observers {
            observer.on_actor_fault(group_id, index, error);
        }
    }

    fn on_session_closed(&mut self, ticks: u64) {
        for observer in &mut self.observers {
            observer.on_session_closed(ticks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl SessionObserver for Recorder {
        fn on_server_started(&mut self, endpoint: &ServerEndpoint) {
            self.events.lock().unwrap().push(format!("started {}", endpoint));
        }

        fn on_actor_spawned(&mut self, group_id: &str, index: usize, _id: BodyId, _pose: Pose) {
            self.events.lock().unwrap().push(format!("spawned {}[{}]", group_id, index));
        }

        fn on_experiment_configured(&mut self, _groups: &GroupTable) {}

        fn on_reset(&mut self, _observations: &Observations) {}

        fn on_tick(&mut self, tick: u64, _observations: &Observations) {
            self.events.lock().unwrap().push(format!("tick {}", tick));
        }

        fn on_session_closed(&mut self, _ticks: u64) {}
    }

    #[test]
    fn test_events_reach_every_observer_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut composite = CompositeObserver::new(vec![
            Box::new(Recorder { events: events.clone() }),
            Box::new(Recorder { events: events.clone() }),
        ]);

        composite.on_server_started(&ServerEndpoint::new("localhost", 2000));
        composite.on_actor_spawned("cars", 0, BodyId(1), Pose::default());
        composite.on_tick(1, &Observations::new());
        composite.on_actor_fault(
            "cars",
            0,
            &ActorError::NotLoaded {
                kind: "vehicle".to_string(),
            },
        );

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "started localhost:2000",
                "started localhost:2000",
                "spawned cars[0]",
                "spawned cars[0]",
                "tick 1",
                "tick 1",
            ]
        );
    }
}
