//! # DI 容器演示
//!
//! 依次演示生命周期、作用域、函数子、键、门面、占位注册与装饰器。

mod model;
mod scenarios;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use infrastructure_common::ContainerRules;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "di-showcase")]
#[command(about = "Lorn DI 容器行为演示")]
struct Cli {
    /// 容器规则文件（TOML）
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 要运行的场景，缺省时全部运行
    #[command(subcommand)]
    scenario: Option<Scenario>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    /// 瞬时、单例与作用域的基本行为
    Simple,
    /// 多线程下的单例
    Threads,
    /// 函数子与带参数解析
    Functors,
    /// 嵌套作用域
    Scopes,
    /// 可释放服务
    Disposable,
    /// 作用域内的可释放服务
    DisposableScoped,
    /// 键控注册
    Keys,
    /// 字段注入
    Injections,
    /// 作用域生命周期与释放顺序
    ScopeLifetime,
    /// 门面容器
    Facade,
    /// 占位注册与延迟解析
    Late,
    /// 装饰器
    Decorator,
    /// 注册检查与校验
    Inspect,
}

impl Scenario {
    const ALL: [Scenario; 13] = [
        Scenario::Simple,
        Scenario::Threads,
        Scenario::Functors,
        Scenario::Scopes,
        Scenario::Disposable,
        Scenario::DisposableScoped,
        Scenario::Keys,
        Scenario::Injections,
        Scenario::ScopeLifetime,
        Scenario::Facade,
        Scenario::Late,
        Scenario::Decorator,
        Scenario::Inspect,
    ];

    fn run(self, rules: &ContainerRules) -> Result<()> {
        model::reset_counters();
        match self {
            Scenario::Simple => scenarios::simple(rules),
            Scenario::Threads => scenarios::threads(rules),
            Scenario::Functors => scenarios::functors(rules),
            Scenario::Scopes => scenarios::scopes(rules),
            Scenario::Disposable => scenarios::disposable(rules),
            Scenario::DisposableScoped => scenarios::disposable_scoped(rules),
            Scenario::Keys => scenarios::keys(rules),
            Scenario::Injections => scenarios::injections(rules),
            Scenario::ScopeLifetime => scenarios::scope_lifetime(rules),
            Scenario::Facade => scenarios::facade(rules),
            Scenario::Late => scenarios::late(rules),
            Scenario::Decorator => scenarios::decorator(rules),
            Scenario::Inspect => scenarios::inspect(rules),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let rules = load_rules(cli.rules.as_ref())?;
    info!("容器规则: {:?}", rules);

    let selected: Vec<Scenario> = match cli.scenario {
        Some(scenario) => vec![scenario],
        None => Scenario::ALL.to_vec(),
    };

    for scenario in selected {
        println!();
        println!("===== {:?} =====", scenario);
        scenario
            .run(&rules)
            .with_context(|| format!("场景 {:?} 执行失败", scenario))?;
    }

    info!("演示结束");
    Ok(())
}

/// 加载容器规则，未指定文件时使用默认规则
fn load_rules(path: Option<&PathBuf>) -> Result<ContainerRules> {
    let Some(path) = path else {
        return Ok(ContainerRules::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取规则文件: {}", path.display()))?;
    let rules = ContainerRules::from_toml_str(&text)
        .with_context(|| format!("规则文件格式错误: {}", path.display()))?;
    Ok(rules)
}
