use clap::Parser;
use cold_storage::{cli::Commands, replay::replay, Cli};
use log::{error, info};
use tokio_util::sync::CancellationToken;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => {
            if let Err(e) = args.init_log() {
                eprintln!("Failed to initialize log. Cause: {e:?}");
                std::process::exit(2);
            }
            let config = match args.create_config() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Invalid configuration. Cause: {e:?}");
                    std::process::exit(22);
                }
            };
            match serde_yaml::to_string(&config) {
                Ok(yaml) => println!("{yaml}"),
                Err(e) => eprintln!("Failed to print configuration. Cause: {e:?}"),
            }
        }

        Commands::Replay(args) => {
            if let Err(e) = args.common.init_log() {
                eprintln!("Failed to initialize log. Cause: {e:?}");
                std::process::exit(2);
            }
            let (config, bodies) = match (args.common.create_config(), args.read_bodies()) {
                (Ok(config), Ok(bodies)) => (config, bodies),
                (Err(e), _) | (_, Err(e)) => {
                    eprintln!("Failed to prepare replay. Cause: {e:?}");
                    std::process::exit(22);
                }
            };

            let token = CancellationToken::new();
            let shutdown = token.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                println!("Received shutdown signal");
                shutdown.cancel();
            }) {
                eprintln!("Failed to set Ctrl-C handler. Cause: {e:?}");
                std::process::exit(1);
            }

            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("Failed to build runtime. Cause: {e:?}");
                    std::process::exit(1);
                }
            };

            match runtime.block_on(replay(config, &args.partition, bodies, token)) {
                Ok(summary) => {
                    for (name, size) in &summary.blobs {
                        println!("{name}\t{size}");
                    }
                    info!("Checkpoint at offset {:?}", summary.checkpoint);
                }
                Err(e) => {
                    error!("Replay failed: {e:?}");
                    std::process::exit(1);
                }
            }
        }
    }
}
