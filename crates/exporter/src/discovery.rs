//! Wildcard expansion into concrete projects.

use pipewatch_core::{Project, Wildcard};
use pipewatch_gitlab::ProjectQuery;
use tracing::{info, warn};

use crate::directory::Directory;
use crate::store::ProjectStore;

/// Totals of one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub wildcards: usize,
    pub failed: usize,
    pub found: usize,
    pub added: usize,
}

fn query_for(wildcard: &Wildcard) -> ProjectQuery {
    ProjectQuery {
        owner: wildcard
            .owner
            .as_ref()
            .map(|owner| (owner.kind, owner.name.clone())),
        search: wildcard.search.clone(),
        archived: wildcard.archived,
        include_subgroups: wildcard
            .owner
            .as_ref()
            .is_some_and(|owner| owner.include_subgroups),
    }
}

/// Expand every wildcard and append projects not yet in `store`.
///
/// Discovered projects inherit the wildcard's parameters. Known names are
/// left untouched. A failing wildcard is logged and skipped.
pub async fn discover_wildcards(
    directory: &Directory,
    wildcards: &[Wildcard],
    store: &ProjectStore,
) -> DiscoveryReport {
    let mut report = DiscoveryReport {
        wildcards: wildcards.len(),
        ..Default::default()
    };

    for (index, wildcard) in wildcards.iter().enumerate() {
        let found = match directory.projects(&query_for(wildcard)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    wildcard = index,
                    search = %wildcard.search,
                    error = %e,
                    "Wildcard discovery failed"
                );
                report.failed += 1;
                continue;
            }
        };

        report.found += found.len();
        for info in found {
            let project =
                Project::with_parameters(info.path_with_namespace, wildcard.parameters.clone());
            let name = project.name.clone();
            if store.insert_if_absent(project) {
                info!(project = %name, wildcard = index, "Discovered project");
                report.added += 1;
            }
        }
    }

    info!(
        wildcards = report.wildcards,
        failed = report.failed,
        found = report.found,
        added = report.added,
        total = store.len(),
        "Wildcard discovery complete"
    );
    report
}
