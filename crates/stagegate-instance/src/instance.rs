//! The per-run workflow state machine.

use serde::{Deserialize, Serialize};
use stagegate_blueprint::{ActivityBlueprint, StageBlueprint, WorkflowBlueprint};

use crate::error::InstanceError;
use crate::status::{ActivityStatus, StageStatus, StatusUpdate};

/// A live activity within a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInstance {
  pub name: String,
  pub code: String,
  #[serde(rename = "type")]
  pub activity_type: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
  pub status: ActivityStatus,
}

impl ActivityInstance {
  fn from_blueprint(blueprint: &ActivityBlueprint) -> Self {
    Self {
      name: blueprint.name.clone(),
      code: blueprint.code.clone(),
      activity_type: blueprint.activity_type.clone(),
      dependencies: blueprint.dependencies.clone(),
      status: ActivityStatus::Pending,
    }
  }
}

/// A live stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInstance {
  pub name: String,
  pub status: StageStatus,
  pub activities: Vec<ActivityInstance>,
}

impl StageInstance {
  fn from_blueprint(blueprint: &StageBlueprint, status: StageStatus) -> Self {
    Self {
      name: blueprint.name.clone(),
      status,
      activities: blueprint
        .activities
        .iter()
        .map(ActivityInstance::from_blueprint)
        .collect(),
    }
  }

  /// Look up an activity by code.
  pub fn activity(&self, code: &str) -> Option<&ActivityInstance> {
    self.activities.iter().find(|a| a.code == code)
  }

  fn is_done(&self) -> bool {
    self
      .activities
      .iter()
      .all(|a| a.status == ActivityStatus::Completed)
  }

  /// Whether every dependency of `activity` is COMPLETED in this stage.
  fn dependencies_met(&self, activity: &ActivityInstance) -> bool {
    activity.dependencies.iter().all(|dependency| {
      self
        .activity(dependency)
        .is_some_and(|a| a.status == ActivityStatus::Completed)
    })
  }
}

/// Outcome of a successful status operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
  /// The activity already had the requested status.
  Unchanged,
  /// The activity status changed.
  Applied,
  /// The activity completed its stage. `next` is the newly activated stage,
  /// or `None` when the whole workflow is complete.
  StageCompleted { stage: String, next: Option<String> },
}

/// A live run of a [`WorkflowBlueprint`].
///
/// Mutated only through its operations; the serialized form is the status
/// snapshot (`{ id, type, currentStage, stages, allActivitiesCompleted }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
  id: String,
  #[serde(rename = "type")]
  workflow_type: String,
  current_stage: String,
  stages: Vec<StageInstance>,
  all_activities_completed: bool,
}

impl WorkflowInstance {
  /// Create an empty, uninitialized instance.
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      workflow_type: String::new(),
      current_stage: String::new(),
      stages: Vec::new(),
      all_activities_completed: false,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn workflow_type(&self) -> &str {
    &self.workflow_type
  }

  /// Name of the ACTIVE stage, or of the last stage once everything completed.
  pub fn current_stage(&self) -> &str {
    &self.current_stage
  }

  pub fn stages(&self) -> &[StageInstance] {
    &self.stages
  }

  pub fn is_initialized(&self) -> bool {
    !self.stages.is_empty()
  }

  /// The single ACTIVE stage, if any.
  pub fn active_stage(&self) -> Option<&StageInstance> {
    self.stages.iter().find(|s| s.status == StageStatus::Active)
  }

  /// Populate stages and activities from a blueprint.
  ///
  /// Every activity starts PENDING; the first stage is ACTIVE and the rest
  /// PENDING.
  pub fn initialize(&mut self, blueprint: &WorkflowBlueprint) -> Result<(), InstanceError> {
    if self.is_initialized() {
      return Err(InstanceError::AlreadyInitialized {
        id: self.id.clone(),
      });
    }

    blueprint.validate()?;

    self.workflow_type = blueprint.workflow_type.clone();
    self.stages = blueprint
      .stages
      .iter()
      .enumerate()
      .map(|(index, stage)| {
        let status = if index == 0 {
          StageStatus::Active
        } else {
          StageStatus::Pending
        };
        StageInstance::from_blueprint(stage, status)
      })
      .collect();
    // validate() guarantees at least one stage
    self.current_stage = self.stages[0].name.clone();
    self.all_activities_completed = false;

    Ok(())
  }

  /// Activities of the ACTIVE stage that are PENDING with every dependency
  /// COMPLETED, in definition order.
  pub fn activities_to_schedule(&self) -> Vec<ActivityInstance> {
    let Some(stage) = self.active_stage() else {
      return Vec::new();
    };

    stage
      .activities
      .iter()
      .filter(|a| a.status == ActivityStatus::Pending)
      .filter(|a| stage.dependencies_met(a))
      .cloned()
      .collect()
  }

  /// Mark every ready activity of the ACTIVE stage SCHEDULED in one step and
  /// return them as scheduled.
  ///
  /// Readiness and scheduling see the same state, so a stage that advances
  /// between two polls can never have its activities matched by a code taken
  /// from the previous stage.
  pub fn schedule_ready(&mut self) -> Result<Vec<ActivityInstance>, InstanceError> {
    if !self.is_initialized() {
      return Err(InstanceError::NotInitialized {
        id: self.id.clone(),
      });
    }

    let mut scheduled = Vec::new();
    for activity in self.activities_to_schedule() {
      self.apply(StatusUpdate::ActivityScheduled, &activity.code)?;
      scheduled.push(ActivityInstance {
        status: ActivityStatus::Scheduled,
        ..activity
      });
    }
    Ok(scheduled)
  }

  /// True exactly when every stage is COMPLETED.
  pub fn all_activities_completed(&self) -> bool {
    self.all_activities_completed
  }

  pub fn activity_scheduled(&mut self, code: &str) -> Result<Transition, InstanceError> {
    self.apply(StatusUpdate::ActivityScheduled, code)
  }

  pub fn activity_failed(&mut self, code: &str) -> Result<Transition, InstanceError> {
    self.apply(StatusUpdate::ActivityFailed, code)
  }

  /// Re-arm an activity after a non-approval signal.
  pub fn activity_pending(&mut self, code: &str) -> Result<Transition, InstanceError> {
    self.apply(StatusUpdate::ActivityPending, code)
  }

  /// Mark an activity COMPLETED, completing and advancing the stage when it
  /// was the last one outstanding.
  pub fn complete_activity(&mut self, code: &str) -> Result<Transition, InstanceError> {
    self.apply(StatusUpdate::CompleteActivity, code)
  }

  /// Apply a status operation to the activity with `code` in the ACTIVE stage.
  pub fn apply(&mut self, update: StatusUpdate, code: &str) -> Result<Transition, InstanceError> {
    if !self.is_initialized() {
      return Err(InstanceError::NotInitialized {
        id: self.id.clone(),
      });
    }
    if self.all_activities_completed {
      return Err(InstanceError::WorkflowCompleted {
        id: self.id.clone(),
      });
    }

    let stage_index = self
      .stages
      .iter()
      .position(|s| s.status == StageStatus::Active)
      .ok_or_else(|| InstanceError::ActivityNotFound {
        code: code.to_string(),
      })?;
    let stage = &mut self.stages[stage_index];

    let activity = stage
      .activities
      .iter_mut()
      .find(|a| a.code == code)
      .ok_or_else(|| InstanceError::ActivityNotFound {
        code: code.to_string(),
      })?;

    let target = update.target();
    if activity.status == target {
      return Ok(Transition::Unchanged);
    }
    if !activity.status.can_transition_to(target) {
      return Err(InstanceError::InvalidTransition {
        code: code.to_string(),
        from: activity.status,
        to: target,
      });
    }
    activity.status = target;

    if update != StatusUpdate::CompleteActivity || !stage.is_done() {
      return Ok(Transition::Applied);
    }

    stage.status = StageStatus::Completed;
    let completed = stage.name.clone();
    let next = self.advance_stage();

    Ok(Transition::StageCompleted {
      stage: completed,
      next,
    })
  }

  /// Activate the first PENDING stage, or mark the workflow complete.
  fn advance_stage(&mut self) -> Option<String> {
    match self
      .stages
      .iter_mut()
      .find(|s| s.status == StageStatus::Pending)
    {
      Some(next) => {
        next.status = StageStatus::Active;
        self.current_stage = next.name.clone();
        Some(next.name.clone())
      }
      None => {
        self.all_activities_completed = true;
        None
      }
    }
  }
}
