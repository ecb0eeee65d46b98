use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::actor::{Actor, ActorCell, Pedestrian, SensorCarrier, Vehicle};
use crate::error::OrchestratorError;
use crate::infra::{Pose, Position};

/// Ordered mapping from group id to the actors of that group.
///
/// Actors keep the order they were added in; every reset, tick and spawn
/// pass walks them in that order, so observation lists line up with the
/// actor lists position by position.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: IndexMap<String, Vec<ActorCell>>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single actor to `group_id`, creating the group if needed
    pub fn add_actor(&mut self, group_id: impl Into<String>, actor: Box<dyn Actor>) {
        self.groups
            .entry(group_id.into())
            .or_default()
            .push(ActorCell::new(actor));
    }

    /// Appends `actors` to `group_id` in the given order
    pub fn add_group(&mut self, group_id: impl Into<String>, actors: Vec<Box<dyn Actor>>) {
        self.groups
            .entry(group_id.into())
            .or_default()
            .extend(actors.into_iter().map(ActorCell::new));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ActorCell])> {
        self.groups
            .iter()
            .map(|(group_id, actors)| (group_id.as_str(), actors.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut [ActorCell])> {
        self.groups
            .iter_mut()
            .map(|(group_id, actors)| (group_id.as_str(), actors.as_mut_slice()))
    }

    pub fn get_group(&self, group_id: &str) -> Result<&[ActorCell], OrchestratorError> {
        self.groups
            .get(group_id)
            .map(Vec::as_slice)
            .ok_or_else(|| OrchestratorError::UnknownGroup {
                group: group_id.to_string(),
            })
    }

    pub fn get_group_mut(&mut self, group_id: &str) -> Result<&mut [ActorCell], OrchestratorError> {
        self.groups
            .get_mut(group_id)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| OrchestratorError::UnknownGroup {
                group: group_id.to_string(),
            })
    }

    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_actors(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Builds a table from a JSON layout such as
    ///
    /// ```json
    /// {
    ///   "vehicles": [{"kind": "vehicle"}, {"kind": "vehicle", "position": {"x": 0, "y": 5, "z": 0}}],
    ///   "peds": "pedestrian",
    ///   "mast": {"kind": "sensor", "params": {"range": 40.0}}
    /// }
    /// ```
    ///
    /// A group may be a list of entries, a single entry, or a bare kind name.
    /// Numbers, booleans and null name no actor kind, so they are rejected
    /// with [`OrchestratorError::Construction`] instead of being normalized.
    /// Nothing is built unless the whole layout is valid.
    pub fn from_layout(layout: &Value, factory: &ActorFactory) -> Result<Self, OrchestratorError> {
        let Value::Object(groups) = layout else {
            return Err(OrchestratorError::Construction {
                reason: format!(
                    "expected a mapping of group id to actors, got {}",
                    json_type(layout)
                ),
            });
        };

        let mut specs: Vec<(&str, Vec<ActorSpec>)> = Vec::with_capacity(groups.len());
        for (group_id, entries) in groups {
            specs.push((group_id.as_str(), normalize_group(group_id, entries)?));
        }

        let mut table = GroupTable::new();
        for (group_id, group_specs) in specs {
            let actors = group_specs
                .iter()
                .map(|spec| factory.build(spec))
                .collect::<Result<Vec<_>, _>>()?;
            table.add_group(group_id, actors);
        }
        Ok(table)
    }
}

fn normalize_group(group_id: &str, entries: &Value) -> Result<Vec<ActorSpec>, OrchestratorError> {
    match entries {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| parse_entry(group_id, entry))
            .collect(),
        entry => Ok(vec![parse_entry(group_id, entry)?]),
    }
}

fn parse_entry(group_id: &str, entry: &Value) -> Result<ActorSpec, OrchestratorError> {
    match entry {
        Value::String(kind) => Ok(ActorSpec::of_kind(kind.as_str())),
        Value::Object(_) => {
            ActorSpec::deserialize(entry).map_err(|err| OrchestratorError::Construction {
                reason: format!("group '{}': {}", group_id, err),
            })
        }
        other => Err(OrchestratorError::Construction {
            reason: format!(
                "group '{}': a {} does not describe an actor",
                group_id,
                json_type(other)
            ),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Declarative description of one actor.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorSpec {
    pub kind: String,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub yaw: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Variant-specific settings
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ActorSpec {
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            position: None,
            yaw: None,
            seed: None,
            params: Map::new(),
        }
    }

    pub fn pose(&self) -> Option<Pose> {
        self.position
            .map(|position| Pose::new(position, self.yaw.unwrap_or(0.0)))
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }
}

type Constructor = Box<dyn Fn(&ActorSpec) -> Box<dyn Actor>>;

/// Builds actors from [`ActorSpec`]s by kind name.
pub struct ActorFactory {
    constructors: HashMap<String, Constructor>,
}

impl Default for ActorFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ActorFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Factory knowing `vehicle`, `pedestrian` and `sensor`
    pub fn with_builtin() -> Self {
        let mut factory = Self::empty();

        factory.register("vehicle", |spec| {
            let mut vehicle = Vehicle::new();
            if let Some(max_speed) = spec.param_f64("max_speed") {
                vehicle = vehicle.with_max_speed(max_speed);
            }
            if let Some(pose) = spec.pose() {
                vehicle = vehicle.with_pose(pose);
            }
            Box::new(vehicle)
        });

        factory.register("pedestrian", |spec| {
            let mut pedestrian = Pedestrian::new(spec.seed.unwrap_or(0));
            if let Some(speed) = spec.param_f64("walking_speed") {
                pedestrian = pedestrian.with_walking_speed(speed);
            }
            if let Some(pose) = spec.pose() {
                pedestrian = pedestrian.with_pose(pose);
            }
            Box::new(pedestrian)
        });

        factory.register("sensor", |spec| {
            let mut sensor = SensorCarrier::new(spec.param_f64("range").unwrap_or(30.0));
            if let Some(channels) = spec.param_u64("channels") {
                sensor = sensor.with_channels(channels as usize);
            }
            if let Some(pose) = spec.pose() {
                sensor = sensor.with_pose(pose);
            }
            Box::new(sensor)
        });

        factory
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&ActorSpec) -> Box<dyn Actor> + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    pub fn build(&self, spec: &ActorSpec) -> Result<Box<dyn Actor>, OrchestratorError> {
        let constructor =
            self.constructors
                .get(&spec.kind)
                .ok_or_else(|| OrchestratorError::Construction {
                    reason: format!("unknown actor kind '{}'", spec.kind),
                })?;
        Ok(constructor(spec))
    }
}
