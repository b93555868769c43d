// Stack lifecycle
pub mod apply;
pub mod destroy;
pub mod plan;

// Inspection
pub mod graph;
pub mod output;
pub mod validate;

use crate::ui;

/// Report a target filter that matched nothing
fn nothing_targeted(target: Option<&str>) {
    match target {
        Some(target) => ui::warn(&format!("No resources match target '{target}'")),
        None => ui::info("The stack declares no resources"),
    }
}
