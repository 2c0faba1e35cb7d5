mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omni")]
#[command(about = "静的サイトを3つのクラウドへ。DNSフェイルオーバー付きで。", long_about = None)]
struct Cli {
    /// プロジェクトルート (省略時はカレントディレクトリ)
    #[arg(short = 'C', long = "root", global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 設定を検証し、リソースの作成順を表示
    Validate {
        /// スタック名 (dev, stg, prod)
        stack: Option<String>,
        /// スタック名 (-s/--stack フラグ、OMNICLOUD_STACK 環境変数)
        #[arg(
            short = 's',
            long = "stack",
            env = "OMNICLOUD_STACK",
            conflicts_with = "stack",
            hide = true
        )]
        stack_flag: Option<String>,
    },
    /// 現在の状態に対する実行計画を表示
    Preview {
        /// スタック名 (dev, stg, prod)
        stack: Option<String>,
        /// スタック名 (-s/--stack フラグ、OMNICLOUD_STACK 環境変数)
        #[arg(
            short = 's',
            long = "stack",
            env = "OMNICLOUD_STACK",
            conflicts_with = "stack",
            hide = true
        )]
        stack_flag: Option<String>,
    },
    /// スタックをプロビジョニング
    Up {
        /// スタック名 (dev, stg, prod)
        stack: Option<String>,
        /// スタック名 (-s/--stack フラグ、OMNICLOUD_STACK 環境変数)
        #[arg(
            short = 's',
            long = "stack",
            env = "OMNICLOUD_STACK",
            conflicts_with = "stack",
            hide = true
        )]
        stack_flag: Option<String>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// スタックを削除
    Down {
        /// スタック名 (dev, stg, prod)
        stack: Option<String>,
        /// スタック名 (-s/--stack フラグ、OMNICLOUD_STACK 環境変数)
        #[arg(
            short = 's',
            long = "stack",
            env = "OMNICLOUD_STACK",
            conflicts_with = "stack",
            hide = true
        )]
        stack_flag: Option<String>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 最後の up で記録された出力を表示
    Outputs {
        /// スタック名 (dev, stg, prod)
        stack: Option<String>,
        /// スタック名 (-s/--stack フラグ、OMNICLOUD_STACK 環境変数)
        #[arg(
            short = 's',
            long = "stack",
            env = "OMNICLOUD_STACK",
            conflicts_with = "stack",
            hide = true
        )]
        stack_flag: Option<String>,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let project_root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    // コマンドディスパッチ
    match cli.command {
        Commands::Validate { stack, stack_flag } => {
            let stack = utils::determine_stack_name(stack.or(stack_flag), &project_root)?;
            commands::validate::handle(&project_root, &stack)?;
        }
        Commands::Preview { stack, stack_flag } => {
            let stack = utils::determine_stack_name(stack.or(stack_flag), &project_root)?;
            commands::preview::handle(&project_root, &stack).await?;
        }
        Commands::Up {
            stack,
            stack_flag,
            yes,
        } => {
            let stack = utils::determine_stack_name(stack.or(stack_flag), &project_root)?;
            commands::up::handle(&project_root, &stack, yes).await?;
        }
        Commands::Down {
            stack,
            stack_flag,
            yes,
        } => {
            let stack = utils::determine_stack_name(stack.or(stack_flag), &project_root)?;
            commands::down::handle(&project_root, &stack, yes).await?;
        }
        Commands::Outputs {
            stack,
            stack_flag,
            json,
        } => {
            let stack = utils::determine_stack_name(stack.or(stack_flag), &project_root)?;
            commands::outputs::handle(&project_root, &stack, json).await?;
        }
        Commands::Version => {
            println!("omnicloud {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ログは stderr に出力 (デフォルトは warn 以上)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
