use std::{env, error::Error, sync::Arc};

use clap::Parser;
use log::info;
use model::Block;
use object_storage::{
    memory::Operation, BlobWriter, MemoryBlockStore, PartitionAndDateNamingStrategy,
    RollingBlobWriter,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env::set_var("RUST_LOG", "object_storage=debug,rolling_writer=info");
    ulog::try_init_log();
    let args = Args::parse();

    let config = config::BlobWriter {
        container: args.container,
        prefix: args.prefix.clone(),
        roll_size_mb: args.roll_size_mb,
        blocks_allowed: args.blocks_allowed,
        block_size: args.block_size,
        ..Default::default()
    };
    let store = Arc::new(MemoryBlockStore::new());
    let naming = PartitionAndDateNamingStrategy::new(args.partition.as_str(), args.prefix);
    let mut writer = RollingBlobWriter::new(&args.partition, Arc::clone(&store), naming, &config)?;

    let token = CancellationToken::new();
    for round in 0..args.rounds {
        let blocks = (0..args.blocks_per_write)
            .map(|i| Block::from_data(format!("round {round} block {i}\n").repeat(16).as_bytes()))
            .collect::<Vec<_>>();
        let blocks = blocks.iter().collect::<Vec<_>>();
        let written = writer.write(&blocks, &token).await?;
        info!("Round {round}: written={written}");
    }

    for name in store.blob_names() {
        let len = store.download(&name).map_or(0, |data| data.len());
        info!("{name}: {len} bytes");
    }
    info!(
        "Requests: put-block={}, put-block-list={}",
        store.requests(Operation::PutBlock),
        store.requests(Operation::PutBlockList)
    );
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, default_value_t = String::from("coldstorage"))]
    pub container: String,

    #[arg(long, default_value_t = String::from("pnp-iotjourney"))]
    pub prefix: String,

    #[arg(long, default_value_t = String::from("0"))]
    pub partition: String,

    #[arg(short, long, default_value_t = 1)]
    pub roll_size_mb: u64,

    #[arg(long, default_value_t = 50)]
    pub blocks_allowed: usize,

    #[arg(long, default_value_t = 65536)]
    pub block_size: usize,

    #[arg(long, default_value_t = 8)]
    pub blocks_per_write: usize,

    #[arg(long, default_value_t = 20)]
    pub rounds: usize,
}
