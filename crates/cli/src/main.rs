//! Arena lottery command-line client
//!
//! Usage:
//!   arena [OPTIONS] <COMMAND>
//!
//! Example:
//!   arena --chain-id 11155111 tickets 0x1000000000000000000000000000000000000001

use std::env;
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{bail, Context};
use arena_core::{canonicalize_nonzero, checksummed, unix_now, Round};
use arena_engine::{
    ArenaConfig, LotteryRpcClient, RoundRegistry, SettlementReconciler, TicketLedgerView,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

enum Command {
    Rounds,
    Tickets(String),
    Winners(u64),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info,arena_engine=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config = ArenaConfig::from_env();
    let mut json = false;
    let mut command = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rpc" | "-r" => {
                i += 1;
                if let Some(url) = args.get(i) {
                    config.rpc_url = url.clone();
                }
            }
            "--chain-id" | "-c" => {
                i += 1;
                config.chain_id = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(config.chain_id);
            }
            "--contract" => {
                i += 1;
                let raw = args.get(i).context("--contract needs an address")?;
                config.contract = Some(canonicalize_nonzero(raw)?);
            }
            "--json" | "-j" => json = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "rounds" => command = Some(Command::Rounds),
            "tickets" => {
                i += 1;
                let owner = args.get(i).context("tickets needs an owner address")?;
                command = Some(Command::Tickets(owner.clone()));
            }
            "winners" => {
                i += 1;
                let round_id = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .context("winners needs a numeric round id")?;
                command = Some(Command::Winners(round_id));
            }
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    let Some(command) = command else {
        print_help();
        return Ok(());
    };

    config.validate()?;
    let contract = config.contract_address()?;

    tracing::debug!("RPC: {}", config.rpc_url);
    tracing::debug!("Chain ID: {}", config.chain_id);
    tracing::debug!("Lottery: {}", checksummed(&contract));

    let client = Arc::new(LotteryRpcClient::new(config.rpc_url.clone(), contract));
    match client.chain_id().await {
        Ok(remote) if remote != config.chain_id => tracing::warn!(
            "RPC endpoint serves chain {}, expected {}",
            remote,
            config.chain_id
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not read chain id: {}", e),
    }
    let registry = Arc::new(RoundRegistry::new(
        client.clone(),
        config.number_spaces.clone(),
    ));
    let tickets = Arc::new(TicketLedgerView::new(client));

    match command {
        Command::Rounds => {
            let rounds = registry.rounds().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rounds)?);
            } else {
                print_rounds(&rounds);
            }
        }
        Command::Tickets(owner) => {
            let owner = canonicalize_nonzero(&owner)?;
            let settlement = SettlementReconciler::new(registry, tickets);
            let views = settlement.tickets_for(owner).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("No tickets for {}", checksummed(&owner));
            } else {
                for view in &views {
                    println!("{:<14} {:<24} {}", view.display_id(), view.round_name, view.status);
                }
            }
        }
        Command::Winners(round_id) => {
            let round = registry.round(round_id).await?;
            let winners = if round.drawn {
                tickets.winners(round_id).await?
            } else {
                tracing::info!("{} has not been drawn yet", round.display_name());
                Vec::new()
            };
            println!("{}", render_winners(&round, &winners, json)?);
        }
    }

    Ok(())
}

/// Undrawn rounds have no winners; JSON output is then an empty list
fn render_winners(round: &Round, winners: &[Address], json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(winners)?);
    }
    if !round.drawn {
        return Ok(format!("{} has not been drawn yet", round.display_name()));
    }

    let mut out = format!(
        "{}: winning number {}, {} winner(s)",
        round.display_name(),
        round.winning_number.unwrap_or_default(),
        winners.len()
    );
    for winner in winners {
        out.push_str(&format!("\n  {}", checksummed(winner)));
    }
    Ok(out)
}

fn print_rounds(rounds: &[Round]) {
    let now = unix_now();
    for round in rounds {
        let detail = match round.time_remaining(now) {
            Some(left) => format!("{}s left", left.as_secs()),
            None => match round.winning_number {
                Some(number) => format!("winning number {}", number),
                None => "awaiting draw".to_string(),
            },
        };
        println!(
            "#{:<4} {:<24} {:<14} {:>6} tickets  numbers {}  {}",
            round.id,
            round.display_name(),
            round.status(now).name(),
            round.ticket_count,
            round.number_space,
            detail
        );
    }
}

fn print_help() {
    println!(
        r#"Arena lottery client

Reads rounds, tickets and winners of the encrypted-number lottery contract.
Ticket numbers are encrypted client-side, so they are never shown here.

USAGE:
    arena [OPTIONS] <COMMAND>

COMMANDS:
    rounds                  List all rounds with their status
    tickets <ADDRESS>       List an owner's tickets across all rounds
    winners <ROUND>         List the winners of a drawn round

OPTIONS:
    -r, --rpc <URL>         Ledger RPC URL
                            Default: $ARENA_RPC_URL or a public Sepolia endpoint
    -c, --chain-id <ID>     Chain ID (11155111 = sepolia)
                            Default: $ARENA_CHAIN_ID or 11155111
        --contract <ADDR>   Lottery contract address
                            Default: known deployment for the chain
    -j, --json              Print JSON instead of text
    -h, --help              Print help

ENVIRONMENT VARIABLES:
    ARENA_RPC_URL, ARENA_CHAIN_ID, ARENA_CONTRACT_ADDRESS
    ARENA_NUMBER_MIN, ARENA_NUMBER_MAX
        Accepted ticket number range (default: 0-999999)
    RUST_LOG
        Logging level (default: info,arena_engine=debug)
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::NumberSpace;

    fn round(drawn: bool) -> Round {
        Round {
            id: 3,
            name: "Weekly".into(),
            winning_number: drawn.then_some(777),
            draw_time: 1_700_000_000,
            drawn,
            ticket_count: 4,
            winner_count: drawn.then_some(1),
            number_space: NumberSpace::default(),
        }
    }

    #[test]
    fn test_undrawn_winners_json_is_empty_list() {
        let out = render_winners(&round(false), &[], true).unwrap();
        let parsed: Vec<Address> = serde_json::from_str(&out).unwrap();
        assert!(parsed.is_empty());

        let text = render_winners(&round(false), &[], false).unwrap();
        assert!(text.ends_with("has not been drawn yet"));
    }

    #[test]
    fn test_drawn_winners_rendering() {
        let winner = Address::repeat_byte(0x11);

        let out = render_winners(&round(true), &[winner], true).unwrap();
        let parsed: Vec<Address> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, vec![winner]);

        let text = render_winners(&round(true), &[winner], false).unwrap();
        assert!(text.contains("winning number 777, 1 winner(s)"));
        assert!(text.contains(&checksummed(&winner)));
    }
}
