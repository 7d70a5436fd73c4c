// SPDX-License-Identifier: MIT

use clap::Parser;
use log::*;
use mystic_stress::config::pool_member_name;
use mystic_stress::{BotConfig, Rate};

use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Mystic-Type stress bot")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 4243)]
    port: u16,

    #[arg(long, default_value = "PUBLIC")]
    lobby: String,

    #[arg(long, default_value = "BOT")]
    name: String,

    /// Seconds each bot stays connected after the handshake.
    #[arg(long, default_value_t = 60)]
    duration: u64,

    /// Chat messages per second.
    #[arg(long, default_value_t = 0.2)]
    chat_rate: f64,

    /// Movement inputs per second.
    #[arg(long, default_value_t = 10.0)]
    input_rate: f64,

    /// Shots per second.
    #[arg(long, default_value_t = 2.0)]
    shoot_rate: f64,

    /// Number of bots to run at once, one connection each.
    #[arg(short, long, default_value_t = 1)]
    bots: usize,

    /// Seed for reproducible traffic.
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds to wait for the server to assign a player id.
    #[arg(long, default_value_t = 5)]
    identity_timeout: u64,

    /// Seconds to wait for each TCP connect attempt.
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,
}

impl Args {
    fn bot_config(&self, index: usize) -> BotConfig {
        let name = pool_member_name(&self.name, index, self.bots);
        let mut config = BotConfig::new(&self.host, self.port, &self.lobby, &name);
        config.duration = Duration::from_secs(self.duration);
        config.chat_rate = Rate(self.chat_rate);
        config.input_rate = Rate(self.input_rate);
        config.shoot_rate = Rate(self.shoot_rate);
        config.seed = self.seed.map(|seed| seed.wrapping_add(16 * index as u64));
        config.identity_timeout = Duration::from_secs(self.identity_timeout);
        config.connect_timeout = Duration::from_secs(self.connect_timeout);
        config
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let configs: Vec<BotConfig> = (0..args.bots).map(|i| args.bot_config(i)).collect();

    info!(
        "starting {} bot(s) against {}:{}",
        configs.len(),
        args.host,
        args.port
    );

    let failures = std::thread::scope(|s| {
        let join_handles: Vec<_> = configs
            .iter()
            .map(|config| s.spawn(move || (config, mystic_stress::run(config))))
            .collect();

        let mut failures = 0;
        for handle in join_handles {
            match handle.join() {
                Ok((_, Ok(report))) => println!("{report}"),
                Ok((config, Err(e))) => {
                    error!("{}: {e}", config.name);
                    failures += 1;
                }
                Err(_) => {
                    error!("a bot thread panicked");
                    failures += 1;
                }
            }
        }
        failures
    });

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        eprintln!("{failures} of {} bot(s) failed", configs.len());
        ExitCode::FAILURE
    }
}
