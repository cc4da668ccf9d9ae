//! Dependency-ordered lifecycle scheduling.
//!
//! `depends_on` edges are leveled with Kahn's algorithm; each level starts in
//! parallel and must drain before the next begins, so a server never starts
//! before everything it depends on has at least been attempted. Stop walks
//! the same levels in reverse. One failing server reports and continues —
//! peers and later levels still run.

use colored::Colorize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::warn;

use mcp_compose_core::config::{ComposeConfig, ServerConfig};
use mcp_compose_core::error::{ComposeError, ComposeResult};

use crate::ContainerRuntime;

/// The leveled start plan plus everything worth warning about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelPlan {
    /// Parallel-startable groups, dependency order.
    pub levels: Vec<Vec<String>>,
    /// `(server, dependency)` pairs where the dependency is not defined.
    pub missing: Vec<(String, String)>,
    /// Servers stuck in a dependency cycle, never emitted into a level.
    pub cycle: Vec<String>,
}

/// Level the selected servers (empty selection means all), expanding the
/// selection by the transitive closure of `depends_on` first.
pub fn compute_levels(
    servers: &HashMap<String, ServerConfig>,
    selection: &[String],
) -> LevelPlan {
    // transitive closure of the selection
    let mut set: BTreeSet<String> = if selection.is_empty() {
        servers.keys().cloned().collect()
    } else {
        let mut set = BTreeSet::new();
        let mut queue: VecDeque<String> = selection
            .iter()
            .filter(|s| servers.contains_key(*s))
            .cloned()
            .collect();
        while let Some(name) = queue.pop_front() {
            if !set.insert(name.clone()) {
                continue;
            }
            if let Some(config) = servers.get(&name) {
                for dep in &config.depends_on {
                    if servers.contains_key(dep) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        set
    };
    for requested in selection {
        if !servers.contains_key(requested) {
            warn!(server = %requested, "selection names an undefined server");
        }
    }
    set.retain(|name| servers.contains_key(name));

    // in-degrees over the induced subgraph; undefined deps are recorded and
    // skipped rather than counted
    let mut missing = Vec::new();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for name in &set {
        let config = &servers[name.as_str()];
        let mut degree = 0;
        for dep in &config.depends_on {
            if !servers.contains_key(dep) {
                missing.push((name.clone(), dep.clone()));
                continue;
            }
            if set.contains(dep) {
                degree += 1;
                dependents.entry(dep.as_str()).or_default().push(name);
            }
        }
        indegree.insert(name, degree);
    }

    // Kahn: peel zero-degree layers
    let mut levels = Vec::new();
    loop {
        let mut level: Vec<String> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| name.to_string())
            .collect();
        if level.is_empty() {
            break;
        }
        level.sort();
        for name in &level {
            indegree.remove(name.as_str());
            if let Some(children) = dependents.get(name.as_str()) {
                for child in children {
                    if let Some(degree) = indegree.get_mut(child) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }
        }
        levels.push(level);
    }

    let mut cycle: Vec<String> = indegree.keys().map(|s| s.to_string()).collect();
    cycle.sort();

    LevelPlan {
        levels,
        missing,
        cycle,
    }
}

/// Outcome for one server.
#[derive(Debug, Clone)]
pub struct ServerResult {
    pub name: String,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleSummary {
    pub results: Vec<ServerResult>,
}

impl LifecycleSummary {
    pub fn ok(&self) -> bool {
        self.results.iter().all(|r| r.error.is_none())
    }

    pub fn failed(&self) -> Vec<&ServerResult> {
        self.results.iter().filter(|r| r.error.is_some()).collect()
    }

    /// Composite error naming every failed server, or `Ok`.
    pub fn into_result(self) -> ComposeResult<Self> {
        let failed: Vec<String> = self
            .failed()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(ComposeError::container(
                failed.join(", "),
                "one or more servers failed",
            ))
        }
    }
}

pub struct LifecycleScheduler {
    runtime: Arc<dyn ContainerRuntime>,
    config: ComposeConfig,
}

impl LifecycleScheduler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: ComposeConfig) -> Self {
        Self { runtime, config }
    }

    /// Start the selection in dependency order. Failures are reported per
    /// server; peers and later levels proceed regardless.
    pub async fn up(&self, selection: &[String]) -> LifecycleSummary {
        let plan = self.plan_with_warnings(selection);

        let networks: BTreeSet<String> = self
            .config
            .servers
            .values()
            .flat_map(|s| s.networks.iter().cloned())
            .collect();
        for network in networks {
            if let Err(e) = self.runtime.ensure_network(&network).await {
                warn!(network = %network, "network setup failed: {e}");
            }
        }

        let mut summary = LifecycleSummary::default();
        for level in &plan.levels {
            let results = self.run_level(level, LevelAction::Start).await;
            summary.results.extend(results);
        }
        summary
    }

    /// Stop the selection, reverse dependency order.
    pub async fn down(&self, selection: &[String]) -> LifecycleSummary {
        let plan = self.plan_with_warnings(selection);
        let mut summary = LifecycleSummary::default();
        for level in plan.levels.iter().rev() {
            let results = self.run_level(level, LevelAction::Stop).await;
            summary.results.extend(results);
        }
        summary
    }

    fn plan_with_warnings(&self, selection: &[String]) -> LevelPlan {
        let plan = compute_levels(&self.config.servers, selection);
        for (server, dep) in &plan.missing {
            warn!(server = %server, dependency = %dep, "missing dependency skipped");
        }
        if !plan.cycle.is_empty() {
            warn!(
                participants = %plan.cycle.join(", "),
                "dependency cycle; listed servers will not be scheduled"
            );
        }
        plan
    }

    /// Launch every server of one level concurrently and drain the results.
    async fn run_level(&self, level: &[String], action: LevelAction) -> Vec<ServerResult> {
        let mut set = JoinSet::new();
        for name in level {
            let Some(config) = self.config.servers.get(name).cloned() else {
                continue;
            };
            let runtime = self.runtime.clone();
            let name = name.clone();
            set.spawn(async move {
                let started = Instant::now();
                let result = match action {
                    LevelAction::Start => runtime.start(&name, &config).await,
                    LevelAction::Stop => runtime.stop(&name).await,
                };
                ServerResult {
                    name,
                    duration: started.elapsed(),
                    error: result.err().map(|e| e.to_string()),
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    print_server_line(action, &result);
                    results.push(result);
                }
                Err(e) => warn!("lifecycle task panicked: {e}"),
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelAction {
    Start,
    Stop,
}

fn print_server_line(action: LevelAction, result: &ServerResult) {
    let verb = match action {
        LevelAction::Start => "started",
        LevelAction::Stop => "stopped",
    };
    match &result.error {
        None => println!(
            "  {} {} {} ({:.1}s)",
            "✔".green(),
            result.name.bold(),
            verb,
            result.duration.as_secs_f64()
        ),
        Some(error) => println!(
            "  {} {} failed: {}",
            "✘".red(),
            result.name.bold(),
            error.red()
        ),
    }
}
