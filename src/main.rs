/*
 *  Pheme - Discord bot for tallying and rewarding community activity.
 *  Copyright (C) 2025  Manuel de Castro
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

mod audit;
mod commands;
mod cooldown;
mod dashboard;
mod leaderboard;
mod moderation;
mod mute;
mod platform;
mod tally;
mod tasks;
#[cfg(test)]
mod test_utils;
mod utils;

use crate::audit::AuditLog;
use crate::cooldown::Cooldowns;
use crate::leaderboard::Leaderboard;
use crate::moderation::Moderator;
use crate::mute::MuteLedger;
use crate::platform::{DiscordPlatform, Platform};
use crate::tally::TallyStore;
use crate::utils::BotConfig;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/* Poise-required data types: */

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/**
 * State shared by the event handler, the slash commands, the background tasks and the dashboard.
 */
#[derive(Clone)]
pub struct Data {
    pub config: Arc<BotConfig>,
    pub platform: Arc<dyn Platform>,
    pub tally: Arc<TallyStore>,
    pub cooldowns: Arc<Cooldowns>,
    pub audit: Arc<AuditLog>,
    pub moderator: Arc<Moderator>,
    pub leaderboard: Arc<Leaderboard>,
    pub started: Instant,
}

impl Data {
    pub fn new(config: Arc<BotConfig>, platform: Arc<dyn Platform>, tally: Arc<TallyStore>) -> Data {
        let audit = Arc::new(AuditLog::new(config.logs_channel()));
        let moderator = Arc::new(Moderator::new(
            platform.clone(),
            audit.clone(),
            MuteLedger::new(config.muted_role_name.clone()),
        ));
        let leaderboard = Arc::new(Leaderboard::new(
            platform.clone(),
            tally.clone(),
            audit.clone(),
            config.leaderboard_channel(),
            config.reward_role(),
        ));

        Self {
            config,
            platform,
            tally,
            cooldowns: Arc::new(Cooldowns::default()),
            audit,
            moderator,
            leaderboard,
            started: Instant::now(),
        }
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        // Ready (bot is started):
        serenity::FullEvent::Ready { data_about_bot, .. } => {
            info!(
                user = %data_about_bot.user.tag(),
                guilds = data_about_bot.guilds.len(),
                "Pheme is connected."
            );
            if !data_about_bot
                .guilds
                .iter()
                .any(|g| g.id == data.config.guild())
            {
                warn!(guild = %data.config.guild(), "The bot is not a member of the configured guild.");
            }
            ctx.set_presence(None, serenity::OnlineStatus::Online);
        }
        serenity::FullEvent::Message { new_message } => {
            commands::handle_message(data, new_message).await;
        }
        _ => {}
    }

    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!(error = %error, "Could not set the bot up.");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(command = %ctx.command().name, error = %error, "Slash command failed.");
            if let Err(e) = ctx.reply(format!("**Error:** {error}.")).await {
                warn!(error = %e, "Could not report a command failure.");
            }
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!(event = %event.snake_case_name(), error = %error, "Event handler failed.");
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!(error = %e, "Could not handle a framework error.");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = Arc::new(BotConfig::from_env()?);
    let schedule = config.schedule()?;
    let tally = Arc::new(TallyStore::open(&config.tally_path));

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let setup_config = config.clone();
    let setup_tally = tally.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::help::help(),
                commands::leaderboard::leaderboard(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                let guild = setup_config.guild();
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild)
                    .await?;

                let platform = Arc::new(DiscordPlatform::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    guild,
                    Duration::from_secs(setup_config.call_timeout_secs),
                ));
                let data = Data::new(setup_config.clone(), platform, setup_tally);

                // Background tasks and the dashboard share the bot's state:
                tokio::spawn(tasks::leaderboard_schedule(data.clone(), schedule));
                tokio::spawn(tasks::periodic_flush(
                    data.clone(),
                    Duration::from_secs(setup_config.flush_interval_minutes * 60),
                ));
                let dashboard_data = data.clone();
                tokio::spawn(async move {
                    if let Err(e) = dashboard::serve(dashboard_data).await {
                        error!(error = %e, "The dashboard stopped.");
                    }
                });

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;

    // Flush the tally one last time on Ctrl-C or SIGTERM, then disconnect:
    let shard_manager = client.shard_manager.clone();
    let shutdown_tally = tally.clone();
    tokio::spawn(async move {
        if tasks::flush_on_shutdown(tasks::shutdown_signal(), &shutdown_tally).await {
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await?;

    tally.flush(true);
    info!("Pheme stopped.");

    Ok(())
}
