use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use common::{EngineCommand, EngineState};
use engine::EngineHandle;

use crate::format::{format_advice, format_params, format_status, parse_portfolio};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub engine: EngineHandle,
    pub allowed_user_ids: Arc<Vec<i64>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Aurum advisor commands:")]
pub enum Command {
    #[command(description = "Start the market and sentiment workers")]
    Start,
    #[command(description = "Stop the workers")]
    Stop,
    #[command(description = "Show price, signal, sentiment and portfolio")]
    Status,
    #[command(description = "Show the current recommendation")]
    Advice,
    #[command(description = "Show the live strategy parameters")]
    Params,
    #[command(description = "Queue a parameter optimization run")]
    Optimize,
    #[command(description = "Set holdings and cash: /portfolio <holdings> <cash>")]
    Portfolio(String),
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(handle_start))
        .branch(case![Command::Stop].endpoint(handle_stop))
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Advice].endpoint(handle_advice))
        .branch(case![Command::Params].endpoint(handle_params))
        .branch(case![Command::Optimize].endpoint(handle_optimize))
        .branch(case![Command::Portfolio(args)].endpoint(handle_portfolio));

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = deps.allowed_user_ids.contains(&uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

async fn handle_start(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if deps.engine.state().await == EngineState::Running {
        bot.send_message(msg.chat.id, "Advisor is already running.").await?;
    } else {
        deps.engine.send(EngineCommand::Start).await;
        bot.send_message(msg.chat.id, "Advisor started.").await?;
    }
    Ok(())
}

async fn handle_stop(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if deps.engine.state().await == EngineState::Stopped {
        bot.send_message(msg.chat.id, "Advisor is already stopped.").await?;
    } else {
        deps.engine.send(EngineCommand::Stop).await;
        bot.send_message(msg.chat.id, "Advisor stopped.").await?;
    }
    Ok(())
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let snap = deps.engine.snapshot().await;
    bot.send_message(msg.chat.id, format_status(&snap)).await?;
    Ok(())
}

async fn handle_advice(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let text = match deps.engine.snapshot().await.advice {
        Some(advice) => format_advice(&advice),
        None => "No advice yet: waiting for the first technical reading.".to_string(),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_params(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let snap = deps.engine.snapshot().await;
    bot.send_message(msg.chat.id, format_params(&snap.params)).await?;
    Ok(())
}

async fn handle_optimize(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    deps.engine.send(EngineCommand::Optimize).await;
    bot.send_message(
        msg.chat.id,
        "Optimization queued. You will get a message when it finishes.",
    )
    .await?;
    Ok(())
}

async fn handle_portfolio(
    bot: Bot,
    msg: Message,
    args: String,
    deps: Arc<BotDeps>,
) -> HandlerResult {
    match parse_portfolio(&args) {
        Ok(portfolio) => {
            deps.engine.send(EngineCommand::SetPortfolio(portfolio)).await;
            bot.send_message(
                msg.chat.id,
                format!(
                    "Portfolio set: holdings {:.2}, cash {:.2}",
                    portfolio.holdings, portfolio.cash
                ),
            )
            .await?;
        }
        Err(e) => {
            bot.send_message(msg.chat.id, e).await?;
        }
    }
    Ok(())
}
