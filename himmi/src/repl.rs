//! Interactive chat loop

use std::io::Write;

use himmi_client::{GatewayClient, ModelInfo, Preference, PricingInfo, Role, Timeouts};
use himmi_config::Config;
use himmi_session::{
    BalanceTracker, CompletionSession, PreferenceRecorder, SessionContext, ShadowComparison, TurnError, TurnRequest,
};
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::args::Args;

const HELP: &str = "\
commands:
  /clear                   start a new conversation
  /stats                   show usage and cost for this conversation
  /model [slug]            show or switch the model
  /shadow on|off           toggle shadow comparison
  /vote primary|shadow     pick the better answer of the last comparison
  /quit                    exit";

struct Settings {
    model: Option<String>,
    shadow_mode: bool,
    api_key: SecretString,
    models: Vec<ModelInfo>,
}

impl Settings {
    fn pricing(&self) -> PricingInfo {
        self.model
            .as_deref()
            .and_then(|slug| self.models.iter().find(|m| m.slug == slug))
            .map(ModelInfo::pricing)
            .unwrap_or_default()
    }
}

enum Flow {
    Continue,
    Quit,
}

pub async fn run(config: &Config, control_plane: himmi_client::ControlPlaneClient, args: &Args) -> anyhow::Result<()> {
    let gateway = GatewayClient::new(
        config.gateway.base_url.clone(),
        Timeouts {
            request: config.gateway.request_timeout()?,
            connect: Some(config.gateway.connect_timeout()?),
        },
    )?;

    let mut session = CompletionSession::new(gateway)
        .with_key_prefix(config.gateway.api_key_prefix.clone())
        .with_preference_recorder(PreferenceRecorder::new(control_plane.clone()));

    if let Some(user_id) = config.playground.user_id {
        let tracker = BalanceTracker::new(control_plane.clone(), user_id);
        drop(tracker.refresh());
        session = session.with_balance_tracker(tracker);
    }

    let models = match control_plane.list_models().await {
        Ok(models) => models,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load model catalog, pricing unavailable");
            Vec::new()
        }
    };

    let mut settings = Settings {
        model: initial_model(args.model.as_deref(), config.playground.default_model.as_deref(), &models),
        shadow_mode: args.shadow || config.playground.shadow_mode,
        api_key: args
            .api_key
            .clone()
            .map(SecretString::from)
            .or_else(|| config.gateway.api_key.clone())
            .unwrap_or_else(|| SecretString::from("")),
        models,
    };

    let ctx = SessionContext::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("himmi playground, /help for commands");

    loop {
        print_prompt(&settings)?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = line else {
            println!();
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match handle_command(command, &ctx, &session, &mut settings)? {
                Flow::Continue => continue,
                Flow::Quit => break,
            }
        }

        run_turn(&session, &ctx, &settings, line).await?;
    }

    Ok(())
}

/// Explicit choice first, then the configured default, then the first catalog entry
fn initial_model(requested: Option<&str>, configured: Option<&str>, models: &[ModelInfo]) -> Option<String> {
    requested
        .or(configured)
        .map(str::to_owned)
        .or_else(|| models.first().map(|m| m.slug.clone()))
}

fn print_prompt(settings: &Settings) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    let model = settings.model.as_deref().unwrap_or("no model");
    let shadow = if settings.shadow_mode { " +shadow" } else { "" };

    write!(out, "[{model}{shadow}] > ")?;
    out.flush()
}

fn handle_command(
    command: &str,
    ctx: &SessionContext,
    session: &CompletionSession,
    settings: &mut Settings,
) -> anyhow::Result<Flow> {
    let (name, argument) = command.split_once(' ').unwrap_or((command, ""));
    let argument = argument.trim();

    match name {
        "quit" | "exit" => return Ok(Flow::Quit),
        "clear" => {
            ctx.clear();
            println!("conversation cleared");
        }
        "stats" => {
            let stats = ctx.stats();
            println!("requests:          {}", stats.request_count);
            println!("completion tokens: {}", stats.cumulative_completion_tokens);
            println!("estimated cost:    ${:.6}", stats.cumulative_cost);
            println!("cache hits:        {} of {} responses", ctx.cache_hits(), ctx.cache_observations());
            if let Some(credits) = session.balance().and_then(BalanceTracker::current) {
                println!("balance:           ${credits:.2}");
            }
        }
        "model" if argument.is_empty() => match &settings.model {
            Some(model) => println!("model: {model}"),
            None => println!("no model selected"),
        },
        "model" => {
            if settings.models.is_empty() || settings.models.iter().any(|m| m.slug == argument) {
                settings.model = Some(argument.to_owned());
                println!("model set to {argument}");
            } else {
                println!("unknown model '{argument}', run `himmi models` to list them");
            }
        }
        "shadow" => match argument {
            "on" => {
                settings.shadow_mode = true;
                println!("shadow comparison on");
            }
            "off" => {
                settings.shadow_mode = false;
                println!("shadow comparison off");
            }
            _ => println!("usage: /shadow on|off"),
        },
        "vote" => match argument.parse::<Preference>() {
            Ok(choice) => match session.submit_vote(ctx, choice) {
                Ok(record) => println!("recorded preference for {} ({})", record.user_preference, chosen_model(&record, choice)),
                Err(e) => println!("{e}"),
            },
            Err(e) => println!("{e}"),
        },
        _ => println!("{HELP}"),
    }

    Ok(Flow::Continue)
}

fn chosen_model(record: &himmi_client::PreferenceRecord, choice: Preference) -> &str {
    match choice {
        Preference::Primary => &record.primary_model,
        Preference::Shadow => &record.shadow_model,
    }
}

async fn run_turn(
    session: &CompletionSession,
    ctx: &SessionContext,
    settings: &Settings,
    text: &str,
) -> anyhow::Result<()> {
    let request = TurnRequest {
        text: text.to_owned(),
        model: settings.model.clone().unwrap_or_default(),
        pricing: settings.pricing(),
        api_key: settings.api_key.clone(),
        shadow_mode: settings.shadow_mode,
    };

    // the assistant message of this turn lands one past the user message
    let reply_index = ctx.snapshot().len() + 1;
    let mut printed = 0;
    let mut revisions = ctx.subscribe();

    let turn = session.submit_turn(ctx, request);
    tokio::pin!(turn);

    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Ok(()) = revisions.changed() => printed = render(ctx, reply_index, printed)?,
            _ = tokio::signal::ctrl_c() => {
                if ctx.cancel() {
                    tracing::debug!("cancelling turn");
                }
            }
        }
    };

    let printed = render(ctx, reply_index, printed)?;
    if printed > 0 {
        println!();
    }

    match result {
        Ok(outcome) => {
            if outcome.cached {
                println!("(cached)");
            }
            if let Some(comparison) = &outcome.comparison {
                print_comparison(comparison);
            }
        }
        Err(TurnError::Validation(message)) => println!("{message}"),
        Err(TurnError::SessionBusy) => println!("a response is still streaming"),
        Err(e) => tracing::debug!(error = %e, "turn failed"),
    }

    Ok(())
}

/// Print whatever the reply gained since the last call
fn render(ctx: &SessionContext, reply_index: usize, printed: usize) -> std::io::Result<usize> {
    let snapshot = ctx.snapshot();
    let Some(reply) = snapshot.get(reply_index).filter(|m| m.role == Role::Assistant) else {
        return Ok(printed);
    };

    let Some(fresh) = reply.content.get(printed..) else {
        return Ok(printed);
    };

    let mut out = std::io::stdout().lock();
    out.write_all(fresh.as_bytes())?;
    out.flush()?;

    Ok(reply.content.len())
}

fn print_comparison(comparison: &ShadowComparison) {
    println!("--- shadow: {} ---", comparison.shadow_model);
    println!("{}", comparison.shadow_response);
    println!("--- which answer was better? /vote primary ({}) or /vote shadow ---", comparison.primary_model);
}
