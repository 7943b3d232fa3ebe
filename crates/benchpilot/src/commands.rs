//! BenchPilot command implementations

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use benchpilot_agent::{
    bench_registry, AgentLoop, AgentPrompt, ConfirmationGate, ConsoleOperator, LoopSettings,
    Outcome, ToolOptions, ToolRegistry, ToolTrait,
};
use benchpilot_config::{self, Config, InstrumentConfig};
use benchpilot_instrument::{Bench, ScriptedTransport};
use benchpilot_provider::{OpenAiCompatProvider, Provider};
use benchpilot_session::{ConversationLog, HistoryStore};

/// Read line from stdin
fn read_line() -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Cannot read from stdin")?;
    Ok(input.trim().to_string())
}

/// Read password from stdin (masked input)
fn read_password() -> Result<String> {
    match rpassword::read_password() {
        Ok(key) => Ok(key.trim().to_string()),
        Err(_) => read_line(),
    }
}

/// Ask with a default shown in brackets; empty input keeps the default
fn ask(question: &str, default: &str) -> Result<String> {
    print!("{} [{}]: ", question, default);
    std::io::stdout().flush()?;
    let answer = read_line()?;
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer
    })
}

/// Interactive setup wizard
pub async fn setup_command() -> Result<()> {
    println!("◆ BenchPilot Setup Wizard");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    let config_path = benchpilot_config::config_path();
    let mut config = Config::load_from(&config_path)
        .await
        .unwrap_or_default();

    // ========================================================
    // Step 1: LLM endpoint
    // ========================================================
    println!("Step 1: LLM endpoint (any OpenAI-compatible /chat/completions API)");
    let api_base = ask(
        "API base URL",
        config
            .llm
            .api_base
            .as_deref()
            .unwrap_or("https://api.openai.com/v1"),
    )?;

    let api_key = loop {
        print!("API key: ");
        std::io::stdout().flush()?;
        let key = read_password()?;
        if !key.is_empty() {
            break key;
        }
        if config.has_api_key() {
            println!("Keeping the existing key.");
            break config.llm.api_key.clone();
        }
        println!("API key cannot be empty. Please try again.");
    };
    let model = ask("Model", &config.llm.model)?;
    println!();

    // ========================================================
    // Step 2: Instruments
    // ========================================================
    println!("Step 2: Instrument addresses (host:port, raw SCPI socket)");
    let oscilloscope = ask("Oscilloscope", &config.bench.oscilloscope.address)?;
    let signal_generator = ask("Signal generator", &config.bench.signal_generator.address)?;
    let power_supply = ask("Power supply", &config.bench.power_supply.address)?;
    println!();

    // ========================================================
    // Step 3: Save
    // ========================================================
    config.llm.api_base = Some(api_base);
    config.llm.api_key = api_key;
    config.llm.model = model;
    config.bench.oscilloscope = InstrumentConfig {
        address: oscilloscope,
        ..config.bench.oscilloscope
    };
    config.bench.signal_generator = InstrumentConfig {
        address: signal_generator,
        ..config.bench.signal_generator
    };
    config.bench.power_supply = InstrumentConfig {
        address: power_supply,
        ..config.bench.power_supply
    };

    print!("Saving configuration... ");
    std::io::stdout().flush()?;
    config.save_to(&config_path).await?;
    println!("✓ Saved to {}", config_path.display());
    println!();

    println!("Setup complete! ✓");
    println!();
    println!("Next steps:");
    println!("  - Check the bench:  benchpilot status");
    println!("  - Measure:          benchpilot measure -m \"measure the DC level on CHAN1\"");

    Ok(())
}

/// Initialize config and workspace
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing BenchPilot...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = benchpilot_config::init().await?;
    tokio::fs::create_dir_all(config.waveform_dir()).await?;

    println!("\n◆ BenchPilot initialized");
    println!("\nNext steps:");
    println!(
        "  1. Add your API key and instrument addresses to {}",
        benchpilot_config::config_path().display()
    );
    println!("     (or run: benchpilot setup)");
    println!("  2. Start measuring: benchpilot measure -m \"measure the frequency on CHAN1\"");

    Ok(())
}

/// Run one request, or a REPL when no message is given
pub async fn measure_command(message: Option<String>) -> Result<()> {
    let config = Config::load().await?;
    let api_key = config.require_api_key().with_context(|| {
        format!(
            "No API key configured. Set API_KEY or llm.api_key in {}",
            benchpilot_config::config_path().display()
        )
    })?;

    let template_path = config.template_path();
    let prompt = AgentPrompt::resolve(template_path.as_deref())
        .await
        .context("Cannot use the configured agent template")?;

    let bench = Bench::connect(&config.bench)
        .await
        .context("Cannot connect to the bench")?;
    bench
        .apply_power_on(&config.bench.power_on_startup)
        .await
        .context("Cannot apply the power-on setting")?;

    let options = ToolOptions {
        waveform_dir: config.waveform_dir(),
        ..Default::default()
    };
    let tools = bench_registry(&bench, &options);

    let log = ConversationLog::open(session_log_path())
        .await
        .context("Cannot open the conversation log")?;
    info!("◆ CONVERSATION LOG AT {}", log.path().display());
    let history = HistoryStore::new(config.history_max_messages(), log);

    let provider = OpenAiCompatProvider::new(api_key, config.api_base(), Some(config.model()));
    let gate = ConfirmationGate::new(Arc::new(ConsoleOperator));
    let mut agent = AgentLoop::new(
        provider,
        tools,
        gate,
        history,
        LoopSettings::from_config(&config),
    )
    .with_prompt(prompt);

    if let Some(request) = message {
        run_request(&mut agent, &request).await?;
        return Ok(());
    }

    println!("◆ Interactive mode (type 'exit' to quit)");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    loop {
        print!("◆ ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        run_request(&mut agent, input).await?;
    }

    Ok(())
}

fn session_log_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    benchpilot_config::logs_dir().join(format!("session-{}.log", stamp))
}

async fn run_request<P: Provider>(agent: &mut AgentLoop<P>, request: &str) -> Result<()> {
    let plan = agent.plan(request).await?;
    println!("\n◆ Plan\n{}\n", plan);

    match agent.execute(request, &plan).await? {
        Outcome::Finished { output, .. } => {
            println!("\n◆ {}\n", output);
        }
        Outcome::Aborted { reason, transcript } => {
            warn!("◆ REQUEST ABORTED: {}", reason);
            println!(
                "\n◆ {} ({} steps taken)\n",
                reason.to_string().as_str().yellow(),
                transcript.len()
            );
        }
    }
    Ok(())
}

/// Registry backed by disconnected transports, for listing only
fn offline_registry() -> ToolRegistry {
    let bench = Bench::new(
        Arc::new(ScriptedTransport::unplugged()),
        Arc::new(ScriptedTransport::unplugged()),
        Arc::new(ScriptedTransport::unplugged()),
    );
    bench_registry(&bench, &ToolOptions::default())
}

/// List the bench tools
pub fn tools_command() -> Result<()> {
    let registry = offline_registry();

    println!("◆ Bench Tools ({})", registry.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for tool in registry.iter() {
        let direct = if tool.return_direct() {
            " [ends the request]"
        } else {
            ""
        };
        println!("{}{}", tool.name().bold(), direct);
        println!("  {}", tool.description());
        for param in tool.schema().params() {
            println!("    {}", param.signature());
        }
    }

    Ok(())
}

fn mark(ok: bool, good: &str, bad: &str) -> String {
    if ok {
        good.green().to_string()
    } else {
        bad.red().to_string()
    }
}

/// Show status
pub async fn status_command() -> Result<()> {
    let config_path = benchpilot_config::config_path();
    let workspace = benchpilot_config::workspace_path();

    println!("◆ BenchPilot Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!(
        "Config:    {} {}",
        config_path.display(),
        mark(config_path.exists(), "[OK]", "[Missing]")
    );
    println!(
        "Workspace: {} {}",
        workspace.display(),
        mark(workspace.exists(), "[OK]", "[Missing]")
    );

    let config = Config::load().await?;
    println!("Model:     {}", config.model());
    println!(
        "API base:  {}",
        config
            .api_base()
            .unwrap_or_else(|| "[default]".to_string())
    );
    println!(
        "API Key:   {}",
        mark(config.has_api_key(), "[Set]", "[Missing]")
    );

    let bench = &config.bench;
    println!("Oscilloscope:     {}", bench.oscilloscope.address);
    println!("Signal generator: {}", bench.signal_generator.address);
    println!("Power supply:     {}", bench.power_supply.address);
    println!(
        "Budgets:   {} iterations, {} s",
        config.agent.max_iterations, config.agent.max_execution_secs
    );
    println!("History:   {} messages", config.history_max_messages());
    match config.template_path() {
        Some(path) => println!(
            "Template:  {} {}",
            path.display(),
            mark(path.exists(), "[OK]", "[Missing]")
        ),
        None => println!("Template:  [built-in]"),
    }

    println!("\n◆ Ready");

    Ok(())
}
