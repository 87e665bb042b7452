use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use memcast_execution::array::Order;

use crate::broadcast::{run_broadcast, BroadcastArgs};
use crate::datastore::run_datastore;
use crate::dump::run_dump;

#[derive(Parser)]
#[command(version, name = "memcast")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Broadcast an array to a local cluster and bind it on every worker")]
    Broadcast {
        #[arg(long, default_value_t = 100, help = "The number of rows of the array")]
        rows: usize,
        #[arg(long, default_value_t = 128, help = "The number of columns of the array")]
        cols: usize,
        #[arg(long, value_enum, default_value_t = ArrayOrder::C, help = "The memory order of the array")]
        order: ArrayOrder,
        #[arg(long, default_value = "B", help = "The name to bind the array to")]
        name: String,
        #[arg(long, help = "The number of simulated hosts")]
        hosts: Option<usize>,
        #[arg(long, help = "The number of workers on each host")]
        workers_per_host: Option<usize>,
        #[arg(
            long,
            help = "The directory for the home directories of the simulated hosts (a temporary directory by default)"
        )]
        root: Option<PathBuf>,
    },
    #[command(about = "Copy a file to every host of a local cluster where it is missing")]
    Dump {
        #[arg(help = "The file to copy")]
        source: PathBuf,
        #[arg(help = "The path of the file on the hosts")]
        target: PathBuf,
        #[arg(long, help = "Do not read the file on every host after copying it")]
        no_pre_warm: bool,
    },
    #[command(about = "Show the local datastore record for a checksum")]
    Datastore {
        #[arg(help = "The hexadecimal MD5 checksum")]
        checksum: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArrayOrder {
    C,
    F,
}

impl From<ArrayOrder> for Order {
    fn from(value: ArrayOrder) -> Self {
        match value {
            ArrayOrder::C => Order::C,
            ArrayOrder::F => Order::F,
        }
    }
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);

    match cli.command {
        Command::Broadcast {
            rows,
            cols,
            order,
            name,
            hosts,
            workers_per_host,
            root,
        } => run_broadcast(BroadcastArgs {
            rows,
            cols,
            order: order.into(),
            name,
            hosts,
            workers_per_host,
            root,
        }),
        Command::Dump {
            source,
            target,
            no_pre_warm,
        } => run_dump(source, target, !no_pre_warm),
        Command::Datastore { checksum } => run_datastore(&checksum),
    }
}
