use crate::utils;
use colored::Colorize;
use omnicloud_cloud::DependencyGraph;
use omnicloud_components::Stack;
use std::path::Path;

pub fn handle(project_root: &Path, stack_name: &str) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());
    println!("スタック: {}", stack_name.cyan());

    let (config, _) = utils::load_stack(project_root, stack_name)?;

    println!();
    println!("{}", "設定:".bold());
    println!("  project:     {}", config.project_name.cyan());
    println!("  environment: {}", config.environment.cyan());
    println!("  domain:      {}", config.domain_name.cyan());
    println!("  bucket:      {}", config.aws_bucket_name.cyan());

    let mut graph = DependencyGraph::new();
    let stack = Stack::build(&mut graph, &config)?;

    println!();
    println!("{}", "コンポーネント:".bold());
    for component in stack.components() {
        println!("  • {}", component.name().green());
    }

    println!();
    println!("{}", "作成順:".bold());
    for (i, node_ref) in graph.creation_order().into_iter().enumerate() {
        let Some(node) = graph.node(node_ref) else {
            continue;
        };
        let label = format!("{}. {} ({})", i + 1, node.name(), node.kind());
        if node.is_logical() {
            println!("  {}", label.dimmed());
        } else if node.retain_on_teardown() {
            println!("  {} {}", label, "[retain]".yellow());
        } else {
            println!("  {}", label);
        }
    }

    println!();
    println!(
        "{} {} 件のリソースを検証しました",
        "✓".green().bold(),
        graph.len()
    );
    Ok(())
}
