use clap::Parser;
use client::{input, Client};
use log::{error, info};
use shared::Response;
use std::io::{self, BufRead, Write};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Numbers to send, e.g. "1 2 2 3" (prompted for when omitted)
    #[arg(short = 'n', long)]
    numbers: Option<String>,

    /// Send this many random integers instead of reading input
    #[arg(short = 'r', long, conflicts_with = "numbers")]
    random: Option<usize>,

    /// Upper bound (exclusive) for random integers
    #[arg(long, default_value = "10")]
    max_value: u32,

    /// Send the input as-is without checking it locally
    #[arg(long)]
    no_validate: bool,
}

fn prompt_for_numbers() -> io::Result<String> {
    print!("Enter array elements (numbers separated by spaces) > ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Attempting to connect to server at {}...", args.server);
    let mut client = Client::connect(&args.server).await?;

    println!("Waiting for server access...");
    let client_id = client.wait_for_admission().await?;
    println!(
        "Connected to {} as client #{}",
        client.server_addr(),
        client_id
    );

    let request = match (&args.numbers, args.random) {
        (Some(numbers), _) => numbers.clone(),
        (None, Some(count)) => input::random_request(&mut rand::thread_rng(), count, args.max_value),
        (None, None) => prompt_for_numbers()?,
    };

    if !args.no_validate {
        if let Err(e) = input::validate_request(&request) {
            error!("[Client #{}] Error: {}", client_id, e);
            eprintln!("Error: empty array or invalid data ({})", e);
            std::process::exit(1);
        }
    }

    info!("[Client #{}] Array entered: {}", client_id, request.trim());

    match client.submit(&request).await? {
        Response::Report {
            original,
            deduplicated,
        } => {
            println!("{}", shared::format_report(&original, &deduplicated));
        }
        Response::Error(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    }

    Ok(())
}
