use std::path::PathBuf;

use clap::{Parser, Subcommand};
use consumergroup::assignment::{divide_partitions, retrieve_partition_leaders};
use consumergroup::identity::InstanceId;
use consumergroup::topology::Topic;
use consumergroup::util::Shutdown;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "consumergroup", version, about = "Consumer group coordination.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join a group and keep its partition assignment until interrupted.
    Run {
        /// Location of the config file.
        #[arg(long, value_name = "PATH", default_value = "Config.toml")]
        config: PathBuf,
    },
    /// Print a newly generated instance id.
    Id,
    /// Print the assignment of partitions `0..n` led by `--leaders` to `--instance`s.
    Assign {
        #[arg(long = "instance", required = true)]
        instances: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        leaders: Vec<i32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::Layer::new().compact().with_writer(std::io::stdout));
    tracing::subscriber::set_global_default(subscriber)?;

    match Cli::parse().command {
        Command::Run { config } => {
            let shutdown = Shutdown::new();
            let handle = shutdown.clone();
            ctrlc::set_handler(move || handle.shutdown())?;
            consumergroup::consumergroup(config, shutdown).await?;
        }
        Command::Id => println!("{}", InstanceId::generate()?),
        Command::Assign { instances, leaders } => {
            let topic = Topic::new("preview").with_leaders(&leaders);
            let leaders = retrieve_partition_leaders(&topic.partitions)?;
            let instances = instances.into_iter().map(InstanceId::from).collect();
            let assignment = divide_partitions(instances, leaders)?;
            for (instance, partitions) in assignment.iter() {
                let ids: Vec<String> = partitions.iter().map(|p| p.id.to_string()).collect();
                println!("{} -> [{}]", instance, ids.join(", "));
            }
        }
    }

    Ok(())
}
