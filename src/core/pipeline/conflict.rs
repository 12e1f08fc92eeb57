use crate::core::error::AppError;
use crate::core::pipeline::output::OutputGenerator;
use crate::core::types::ErrorCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Two or more outputs resolving to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub destination: PathBuf,
    pub origins: Vec<String>,
}

/// Group file outputs by destination and keep the groups with more than one member.
///
/// Discarded outputs never collide. Result is ordered by destination.
pub fn find_collisions(outputs: &[OutputGenerator]) -> Vec<Collision> {
    let mut by_destination: BTreeMap<&Path, Vec<String>> = BTreeMap::new();
    for output in outputs {
        if let Some(destination) = output.destination() {
            by_destination
                .entry(destination)
                .or_default()
                .push(output.origin());
        }
    }
    by_destination
        .into_iter()
        .filter(|(_, origins)| origins.len() > 1)
        .map(|(destination, mut origins)| {
            origins.sort();
            Collision {
                destination: destination.to_path_buf(),
                origins,
            }
        })
        .collect()
}

/// Fail when any destination has more than one writer.
pub fn detect_conflicts(outputs: &[OutputGenerator]) -> Result<(), AppError> {
    let collisions = find_collisions(outputs);
    if collisions.is_empty() {
        return Ok(());
    }
    Err(collision_error(&collisions))
}

pub fn collision_error(collisions: &[Collision]) -> AppError {
    let mut message = format!(
        "{} destination(s) would be written more than once:",
        collisions.len()
    );
    for collision in collisions {
        message.push_str(&format!("\n  {}", collision.destination.display()));
        for origin in &collision.origins {
            message.push_str(&format!("\n    from {}", origin));
        }
    }
    let mut error =
        AppError::new(ErrorCategory::CollisionError, message).with_code("CB-COLL-001");
    for (index, collision) in collisions.iter().enumerate() {
        error.add_context(
            &format!("collision[{}]", index),
            &collision.destination.display().to_string(),
        );
    }
    error
}
