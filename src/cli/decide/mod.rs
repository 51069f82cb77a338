//! Decide command - resolves one test and prints it as JSON

use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use crate::api::types::ExperimentationTestResponse;
use crate::config::{AppConfig, ExperimentationConfig};
use crate::domain::experimentation::{ExperimentationPlatform, ExperimentationTestName};
use crate::infrastructure::events::InMemoryEventBus;
use crate::infrastructure::experimentation::{
    build_experimentation_service, ExperimentationServiceTrait,
};

#[derive(Args, Debug)]
pub struct DecideArgs {
    /// Experimentation test name
    pub name: String,

    /// Decision platform (overrides config): sdk or in_house
    #[arg(long)]
    pub platform: Option<ExperimentationPlatform>,
}

pub async fn run(args: DecideArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let response = decide(&config.experimentation, &args)
        .await?
        .with_context(|| format!("No decision for experimentation test '{}'", args.name))?;

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

/// Resolve `args.name` against the configured (or overridden) platform
pub async fn decide(
    config: &ExperimentationConfig,
    args: &DecideArgs,
) -> anyhow::Result<Option<ExperimentationTestResponse>> {
    let name = ExperimentationTestName::new(&args.name)?;

    let mut config = config.clone();
    if let Some(platform) = args.platform {
        config.platform = platform;
    }

    let events = Arc::new(InMemoryEventBus::new(config.event_bus_capacity));
    let service = build_experimentation_service(&config, events).await?;

    let test = service.get_experimentation_test(&name).await?;

    Ok(test.as_ref().map(ExperimentationTestResponse::from_domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InHouseConfig, InHouseRollout};
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: DecideArgs,
    }

    fn in_house_rollouts() -> ExperimentationConfig {
        ExperimentationConfig {
            in_house: InHouseConfig {
                tests: vec![InHouseRollout {
                    name: "new-checkout".to_string(),
                    percent: 100,
                }],
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_platform_flag() {
        let cli = TestCli::parse_from(["decide", "new-checkout", "--platform", "in-house"]);

        assert_eq!(cli.args.name, "new-checkout");
        assert_eq!(cli.args.platform, Some(ExperimentationPlatform::InHouse));
    }

    #[tokio::test]
    async fn test_decide_with_platform_override() {
        let args = DecideArgs {
            name: "new-checkout".to_string(),
            platform: Some(ExperimentationPlatform::InHouse),
        };

        let response = decide(&in_house_rollouts(), &args).await.unwrap().unwrap();

        assert_eq!(response.name, "new-checkout");
        assert_eq!(response.assignment, 1);
    }

    #[tokio::test]
    async fn test_decide_unknown_test() {
        let args = DecideArgs {
            name: "missing".to_string(),
            platform: Some(ExperimentationPlatform::InHouse),
        };

        assert!(decide(&in_house_rollouts(), &args).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decide_rejects_invalid_name() {
        let args = DecideArgs {
            name: "bad name".to_string(),
            platform: Some(ExperimentationPlatform::InHouse),
        };

        assert!(decide(&in_house_rollouts(), &args).await.is_err());
    }
}
