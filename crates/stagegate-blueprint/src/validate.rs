//! Structural validation of stage dependency graphs.

use std::collections::{HashMap, HashSet};

use crate::error::BlueprintError;
use crate::stage::StageBlueprint;

/// Validate a single stage: non-empty, unique codes, known dependencies, no cycles.
pub(crate) fn validate_stage(stage: &StageBlueprint) -> Result<(), BlueprintError> {
  if stage.activities.is_empty() {
    return Err(BlueprintError::EmptyStage {
      stage: stage.name.clone(),
    });
  }

  let mut codes = HashSet::new();
  for activity in &stage.activities {
    if !codes.insert(activity.code.as_str()) {
      return Err(BlueprintError::DuplicateActivityCode {
        stage: stage.name.clone(),
        code: activity.code.clone(),
      });
    }
  }

  for activity in &stage.activities {
    for dependency in &activity.dependencies {
      if !codes.contains(dependency.as_str()) {
        return Err(BlueprintError::UnknownDependency {
          stage: stage.name.clone(),
          code: activity.code.clone(),
          dependency: dependency.clone(),
        });
      }
    }
  }

  if let Some(code) = find_cycle(stage) {
    return Err(BlueprintError::DependencyCycle {
      stage: stage.name.clone(),
      code,
    });
  }

  Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
  White,
  Gray,
  Black,
}

/// Find a dependency cycle using DFS colouring. Returns a code on the cycle.
fn find_cycle(stage: &StageBlueprint) -> Option<String> {
  let adjacency: HashMap<&str, Vec<&str>> = stage
    .activities
    .iter()
    .map(|a| {
      (
        a.code.as_str(),
        a.dependencies.iter().map(String::as_str).collect(),
      )
    })
    .collect();

  let mut color: HashMap<&str, Color> = adjacency
    .keys()
    .map(|code| (*code, Color::White))
    .collect();

  fn dfs<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    color: &mut HashMap<&'a str, Color>,
  ) -> Option<&'a str> {
    color.insert(node, Color::Gray);

    if let Some(neighbors) = adjacency.get(node) {
      for &neighbor in neighbors {
        match color.get(neighbor) {
          // Back edge
          Some(Color::Gray) => return Some(neighbor),
          Some(Color::White) => {
            if let Some(found) = dfs(neighbor, adjacency, color) {
              return Some(found);
            }
          }
          _ => {}
        }
      }
    }

    color.insert(node, Color::Black);
    None
  }

  // Walk in definition order so the reported code is deterministic.
  for activity in &stage.activities {
    let code = activity.code.as_str();
    if color.get(code) == Some(&Color::White)
      && let Some(found) = dfs(code, &adjacency, &mut color)
    {
      return Some(found.to_string());
    }
  }

  None
}

#[cfg(test)]
mod tests {
  use crate::{ActivityBlueprint, BlueprintError, StageBlueprint, WorkflowBlueprint};

  fn human(code: &str) -> ActivityBlueprint {
    ActivityBlueprint::new(code, code, "HUMAN")
  }

  fn single_stage(activities: Vec<ActivityBlueprint>) -> WorkflowBlueprint {
    WorkflowBlueprint::new("Test", vec![StageBlueprint::new("Stage 1", activities)])
  }

  #[test]
  fn test_valid_blueprint() {
    let blueprint = single_stage(vec![
      human("SimpleOne"),
      human("SimpleTwo"),
      human("SimpleThree").with_dependencies(["SimpleOne"]),
      human("Simple4").with_dependencies(["SimpleTwo", "SimpleThree"]),
    ]);

    assert!(blueprint.validate().is_ok());
    assert_eq!(blueprint.activity_count(), 4);
  }

  #[test]
  fn test_rejects_no_stages() {
    let blueprint = WorkflowBlueprint::new("Test", vec![]);
    assert!(matches!(blueprint.validate(), Err(BlueprintError::NoStages)));
  }

  #[test]
  fn test_rejects_empty_stage() {
    let blueprint = WorkflowBlueprint::new(
      "Test",
      vec![
        StageBlueprint::new("First", vec![human("A")]),
        StageBlueprint::new("Second", vec![]),
      ],
    );

    match blueprint.validate() {
      Err(BlueprintError::EmptyStage { stage }) => assert_eq!(stage, "Second"),
      other => panic!("expected EmptyStage, got {:?}", other),
    }
  }

  #[test]
  fn test_rejects_duplicate_code() {
    let blueprint = single_stage(vec![human("A"), human("A")]);
    assert!(matches!(
      blueprint.validate(),
      Err(BlueprintError::DuplicateActivityCode { .. })
    ));
  }

  #[test]
  fn test_same_code_in_different_stages_is_allowed() {
    let blueprint = WorkflowBlueprint::new(
      "Test",
      vec![
        StageBlueprint::new("First", vec![human("A")]),
        StageBlueprint::new("Second", vec![human("A")]),
      ],
    );
    assert!(blueprint.validate().is_ok());
  }

  #[test]
  fn test_rejects_unknown_dependency() {
    let blueprint = single_stage(vec![human("A").with_dependencies(["MISSING"])]);

    match blueprint.validate() {
      Err(BlueprintError::UnknownDependency {
        code, dependency, ..
      }) => {
        assert_eq!(code, "A");
        assert_eq!(dependency, "MISSING");
      }
      other => panic!("expected UnknownDependency, got {:?}", other),
    }
  }

  #[test]
  fn test_rejects_cross_stage_dependency() {
    let blueprint = WorkflowBlueprint::new(
      "Test",
      vec![
        StageBlueprint::new("First", vec![human("A")]),
        StageBlueprint::new("Second", vec![human("B").with_dependencies(["A"])]),
      ],
    );
    assert!(matches!(
      blueprint.validate(),
      Err(BlueprintError::UnknownDependency { .. })
    ));
  }

  #[test]
  fn test_rejects_cycle() {
    let blueprint = single_stage(vec![
      human("A").with_dependencies(["C"]),
      human("B").with_dependencies(["A"]),
      human("C").with_dependencies(["B"]),
    ]);
    assert!(matches!(
      blueprint.validate(),
      Err(BlueprintError::DependencyCycle { .. })
    ));
  }

  #[test]
  fn test_rejects_self_dependency() {
    let blueprint = single_stage(vec![human("A").with_dependencies(["A"])]);

    match blueprint.validate() {
      Err(BlueprintError::DependencyCycle { code, .. }) => assert_eq!(code, "A"),
      other => panic!("expected DependencyCycle, got {:?}", other),
    }
  }

  #[test]
  fn test_from_json_str() {
    let json = r#"{
      "type": "Standard Workflow",
      "stages": [
        {
          "name": "ASSIGN FO",
          "activities": [
            { "name": "Assign FO User", "code": "AssignFOUser", "type": "HUMAN" },
            { "name": "Accept Workflow", "code": "AcceptWorkflow", "type": "HUMAN", "dependencies": ["AssignFOUser"] }
          ]
        }
      ]
    }"#;

    let blueprint = WorkflowBlueprint::from_json_str(json).unwrap();
    assert_eq!(blueprint.workflow_type, "Standard Workflow");
    assert_eq!(blueprint.stages[0].activities[0].dependencies, Vec::<String>::new());
    assert_eq!(
      blueprint.stages[0].activity("AcceptWorkflow").unwrap().dependencies,
      vec!["AssignFOUser".to_string()]
    );
  }

  #[test]
  fn test_from_json_str_validates() {
    let json = r#"{ "type": "Broken", "stages": [] }"#;
    assert!(matches!(
      WorkflowBlueprint::from_json_str(json),
      Err(BlueprintError::NoStages)
    ));

    assert!(matches!(
      WorkflowBlueprint::from_json_str("not json"),
      Err(BlueprintError::Parse(_))
    ));
  }
}
