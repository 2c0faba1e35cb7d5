use crate::utils;
use colored::Colorize;
use omnicloud_cloud::{DependencyGraph, Engine, StateManager};
use omnicloud_components::{Stack, simulated_provisioner};
use std::path::Path;
use std::sync::Arc;

pub async fn handle(project_root: &Path, stack_name: &str) -> anyhow::Result<()> {
    println!("スタック: {}", stack_name.cyan());
    let (config, _) = utils::load_stack(project_root, stack_name)?;

    let mut graph = DependencyGraph::new();
    Stack::build(&mut graph, &config)?;

    let state = StateManager::new(project_root, stack_name).load().await?;
    let engine = Engine::new(Arc::new(simulated_provisioner()));
    let plan = engine.plan(&graph, &state);

    println!();
    println!("{}", "実行計画:".bold());
    utils::print_plan(&plan);
    Ok(())
}
