mod config;
mod telemetry;

use clap::Parser;
use config::{CliArgs, CliConfig, Command};
use seqforge::{
    BackendKind, ClientPoolRegistry, ClockSequence, CounterSequence, IdGenerator, PoolHandle,
    RedisConnector, SequenceGenerator, SnowflakeId, SystemClock,
};
use telemetry::init_telemetry;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry();

    match &config.command {
        Command::Snowflake { width, count } => {
            let clock = ClockSequence::with_time(config.clock, SystemClock)?;
            for _ in 0..*count {
                println!("{}", clock.generate(*width)?);
            }
        }
        Command::Decode { id, width } => {
            println!("{:?}", SnowflakeId::from_raw(*id, *width));
        }
        Command::Next { namespace, count } => {
            let ids = build_generator(&config)?;
            for _ in 0..*count {
                println!("{}", ids.next_id(namespace)?);
            }
        }
        Command::Current { namespace } => {
            let ids = build_generator(&config)?;
            println!("{}", ids.current_id(namespace)?);
        }
        Command::Set { namespace, value } => {
            let ids = build_generator(&config)?;
            if !ids.set_value(namespace, *value) {
                anyhow::bail!("failed to set `{namespace}` to {value}");
            }
            tracing::info!(namespace = %namespace, value, backend = %ids.backend(), "value set");
        }
    }
    Ok(())
}

fn build_generator(config: &CliConfig) -> anyhow::Result<IdGenerator> {
    let generator = match config.backend {
        BackendKind::Counter => {
            let registry = ClientPoolRegistry::new(RedisConnector::new(config.redis_timeout))?;
            let handle = PoolHandle::new(registry, config.endpoint.clone(), config.pool.clone());
            IdGenerator::new(CounterSequence::with_key_prefix(handle, config.key_prefix.clone()))
        }
        BackendKind::Clock => {
            IdGenerator::new(ClockSequence::with_time(config.clock, SystemClock)?)
        }
    };
    tracing::debug!(backend = %generator.backend(), endpoint = ?config.endpoint, "generator ready");
    Ok(generator)
}
