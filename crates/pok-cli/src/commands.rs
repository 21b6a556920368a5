use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use colored::Colorize;
use pok_sdk::{
    AppConfig, AppStatus, ContentHasher, Entry, PokApp, ResetConfirmation, Timestamp, CONFIG_FILE,
};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    if let Command::Init(args) = &cli.command {
        return cmd_init(&cli.data_dir, args, format);
    }

    let app = PokApp::open_dir(&cli.data_dir)
        .with_context(|| format!("opening ledger in {}", cli.data_dir.display()))?;
    let result = match cli.command {
        Command::Init(_) => Ok(()),
        Command::Record(args) => cmd_record(&app, args, format),
        Command::Log(args) => cmd_log(&app, args, format),
        Command::Verify(_) => cmd_verify(&app, format),
        Command::Export(args) => cmd_export(&app, args, format),
        Command::Import(args) => cmd_import(&app, args, format),
        Command::Ack(args) => cmd_ack(&app, args, format),
        Command::Status(_) => cmd_status(&app, format),
        Command::Reset(args) => cmd_reset(&app, args, format),
        Command::ClearBlock(_) => cmd_clear_block(&app, format),
    };
    let closed = app.teardown();
    result?;
    closed.context("closing ledger")?;
    Ok(())
}

fn cmd_init(data_dir: &Path, args: &InitArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = AppConfig::rooted_at(data_dir);
    let path = data_dir.join(CONFIG_FILE);
    let wrote = if path.exists() && !args.force {
        false
    } else {
        config.save(&path)?;
        true
    };
    let app = PokApp::open_dir(data_dir)?;
    let status = app.teardown()?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "data_dir": data_dir.display().to_string(),
            "config_written": wrote,
            "entries": status.entries,
        }))?,
        OutputFormat::Text => {
            println!(
                "{} Initialized ledger in {}",
                "✓".green().bold(),
                data_dir.display().to_string().bold()
            );
            if wrote {
                println!("  Config: {}", path.display().to_string().cyan());
            } else {
                println!("  Config: {} (kept existing)", path.display().to_string().cyan());
            }
            println!("  Entries: {}", status.entries.to_string().bold());
        }
    }
    Ok(())
}

fn cmd_record(app: &PokApp, args: RecordArgs, format: OutputFormat) -> anyhow::Result<()> {
    let payload = decode_payload(&args.payload, args.hex)?;
    let entry = app.record(payload)?;
    match format {
        OutputFormat::Json => print_json(&entry_json(&entry))?,
        OutputFormat::Text => println!(
            "{} Recorded {} {}",
            "✓".green().bold(),
            format!("#{}", entry.index).yellow().bold(),
            entry.hash.short_hex().dimmed()
        ),
    }
    Ok(())
}

fn cmd_log(app: &PokApp, args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let snapshot = app.entries(args.from);
    let limit = args.limit.unwrap_or(usize::MAX);
    let entries = snapshot.iter().take(limit);

    match format {
        OutputFormat::Json => {
            let list: Vec<_> = entries.map(entry_json).collect();
            print_json(&serde_json::Value::Array(list))?;
        }
        OutputFormat::Text => {
            let mut shown = 0;
            for entry in entries {
                println!(
                    "{}  {}  {}  {}",
                    format!("#{}", entry.index).yellow().bold(),
                    entry.hash.short_hex().dimmed(),
                    format_timestamp(entry.timestamp),
                    payload_preview(&entry.payload)
                );
                shown += 1;
            }
            if shown == 0 {
                println!("No entries.");
            }
        }
    }
    Ok(())
}

fn cmd_verify(app: &PokApp, format: OutputFormat) -> anyhow::Result<()> {
    let entries = app.ledger().len();
    let outcome = app.verify();
    match format {
        OutputFormat::Json => print_json(&json!({
            "intact": outcome.is_ok(),
            "entries": entries,
            "error": outcome.as_ref().err().map(|e| e.to_string()),
        }))?,
        OutputFormat::Text => match &outcome {
            Ok(()) => {
                println!("{} Hash chain integrity verified", "✓".green().bold());
                println!("  Entries: {}", entries.to_string().bold());
            }
            Err(err) => println!("{} {}", "✗".red().bold(), err.to_string().red()),
        },
    }
    outcome.context("integrity check failed")
}

fn cmd_export(app: &PokApp, args: ExportArgs, format: OutputFormat) -> anyhow::Result<()> {
    let out = app.export_for(&args.peer)?;
    let encoded = hex::encode(&out.bytes);
    match format {
        OutputFormat::Json => print_json(&json!({
            "peer": args.peer,
            "delta": encoded,
            "bytes": out.bytes.len(),
            "start_index": out.start_index,
            "entries": out.entry_count,
            "remaining": out.remaining,
        }))?,
        OutputFormat::Text => {
            // stdout carries only the hex.
            println!("{encoded}");
            if out.is_empty() {
                eprintln!("{} {} is up to date", "✓".green(), args.peer.bold());
            } else {
                eprintln!(
                    "{} entries from {} ({} bytes), {} remaining",
                    out.entry_count.to_string().bold(),
                    format!("#{}", out.start_index).yellow(),
                    out.bytes.len(),
                    out.remaining
                );
            }
        }
    }
    Ok(())
}

fn cmd_import(app: &PokApp, args: ImportArgs, format: OutputFormat) -> anyhow::Result<()> {
    let bytes = hex::decode(args.delta.trim()).context("delta is not valid hex")?;
    let result = app.import_from(&args.peer, &bytes)?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "peer": args.peer,
            "appended": result.appended,
            "already_known": result.already_known,
            "last_index": result.last_index,
        }))?,
        OutputFormat::Text => println!(
            "{} Merged from {}: {} new, {} already known",
            "✓".green().bold(),
            args.peer.bold(),
            result.appended.to_string().green(),
            result.already_known
        ),
    }
    Ok(())
}

fn cmd_ack(app: &PokApp, args: AckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let moved = app.acknowledge(&args.peer, args.index)?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "peer": args.peer,
            "index": args.index,
            "advanced": moved,
        }))?,
        OutputFormat::Text if moved => println!(
            "{} {} holds entries through {}",
            "✓".green().bold(),
            args.peer.bold(),
            format!("#{}", args.index).yellow()
        ),
        OutputFormat::Text => println!("{} is already at or past #{}", args.peer.bold(), args.index),
    }
    Ok(())
}

fn cmd_status(app: &PokApp, format: OutputFormat) -> anyhow::Result<()> {
    let status = app.status();
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => print_status(&status),
    }
    Ok(())
}

fn print_status(status: &AppStatus) {
    println!("pok {} ({})", status.version, status.state.to_string().bold());
    let integrity = if status.intact {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "Ledger: {} entries, integrity {}",
        status.entries.to_string().bold(),
        integrity
    );
    if let Some(head) = &status.head_hash {
        println!("Head: {}", head.cyan());
    }
    if let Some(reason) = &status.blocked {
        println!("Blocked: {}", reason.red());
    }
    if status.peers.is_empty() {
        println!("Peers: none");
    } else {
        println!("Peers:");
        for peer in &status.peers {
            let known = peer
                .last_known_index
                .map(|i| format!("#{i}"))
                .unwrap_or_else(|| "nothing".into());
            println!("  {}  holds {}, {} pending", peer.peer.bold(), known.yellow(), peer.pending);
        }
    }
    let features: Vec<String> = status.features.iter().map(|f| f.to_string()).collect();
    println!("Features: {}", features.join(", ").dimmed());
}

fn cmd_reset(app: &PokApp, args: ResetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let confirm = ResetConfirmation::parse(args.confirm.as_deref().unwrap_or_default())
        .context("refusing to reset without --confirm reset")?;
    let dropped = app.ledger().len();
    app.reset(confirm)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "reset": true, "dropped": dropped }))?,
        OutputFormat::Text => println!(
            "{} Ledger reset; {} entries removed",
            "✓".green().bold(),
            dropped.to_string().bold()
        ),
    }
    Ok(())
}

fn cmd_clear_block(app: &PokApp, format: OutputFormat) -> anyhow::Result<()> {
    let reason = app.ledger().blocked();
    app.clear_block().context("block not lifted")?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "cleared": reason.is_some(),
            "reason": reason.as_ref().map(|r| r.to_string()),
        }))?,
        OutputFormat::Text => match reason {
            Some(reason) => println!("{} Block lifted: {}", "✓".green().bold(), reason),
            None => println!("Ledger was not blocked."),
        },
    }
    Ok(())
}

fn decode_payload(input: &str, is_hex: bool) -> anyhow::Result<Vec<u8>> {
    if is_hex {
        hex::decode(input.trim()).context("payload is not valid hex")
    } else if input.is_empty() {
        bail!("payload is empty")
    } else {
        Ok(input.as_bytes().to_vec())
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("0x{}", hex::encode(payload)),
    }
}

fn format_timestamp(ts: Timestamp) -> String {
    i64::try_from(ts.as_millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.as_millis().to_string())
}

fn entry_json(entry: &Entry) -> serde_json::Value {
    json!({
        "index": entry.index,
        "timestamp": entry.timestamp.as_millis(),
        "time": format_timestamp(entry.timestamp),
        "payload": hex::encode(&entry.payload),
        "payload_digest": ContentHasher::PAYLOAD.hash(&entry.payload).to_hex(),
        "prev_hash": entry.prev_hash.to_hex(),
        "hash": entry.hash.to_hex(),
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn run(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["pok", "--data-dir", dir.to_str().unwrap()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn hex_payload_decodes() {
        assert_eq!(decode_payload("cafe", true).unwrap(), vec![0xca, 0xfe]);
        assert!(decode_payload("zz", true).is_err());
        assert!(decode_payload("", false).is_err());
        assert_eq!(decode_payload("hi", false).unwrap(), b"hi".to_vec());
    }

    #[test]
    fn preview_falls_back_to_hex() {
        assert_eq!(payload_preview(b"read chapter 3"), "read chapter 3");
        assert_eq!(payload_preview(&[0xff, 0x00]), "0xff00");
        assert_eq!(payload_preview(b"a\nb"), "0x610a62");
    }

    #[test]
    fn timestamps_render_utc() {
        let ts = Timestamp::from_millis(1_700_000_000_000);
        assert_eq!(format_timestamp(ts), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn entry_json_carries_hex_fields() {
        let app_dir = tempfile::tempdir().unwrap();
        let app = PokApp::open_dir(app_dir.path()).unwrap();
        let entry = app.record("x").unwrap();
        let value = entry_json(&entry);
        assert_eq!(value["index"], 0);
        assert_eq!(value["payload"], "78");
        assert_eq!(value["hash"], entry.hash.to_hex());
        assert_eq!(
            value["payload_digest"],
            ContentHasher::PAYLOAD.hash(b"x").to_hex()
        );
    }

    #[test]
    fn record_verify_and_reset_flow() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());

        run(dir.path(), &["record", "finished module 1"]).unwrap();
        run(dir.path(), &["record", "--hex", "0102"]).unwrap();
        run(dir.path(), &["verify"]).unwrap();
        run(dir.path(), &["--format", "json", "log", "--from", "1"]).unwrap();

        assert!(run(dir.path(), &["reset"]).is_err());
        run(dir.path(), &["reset", "--confirm", "reset"]).unwrap();
        assert_eq!(PokApp::open_dir(dir.path()).unwrap().status().entries, 0);
    }

    #[test]
    fn export_import_between_data_dirs() {
        let phone = tempfile::tempdir().unwrap();
        let tablet = tempfile::tempdir().unwrap();
        run(phone.path(), &["record", "lesson one"]).unwrap();
        run(phone.path(), &["record", "lesson two"]).unwrap();

        let delta = PokApp::open_dir(phone.path())
            .unwrap()
            .export_for("tablet")
            .unwrap();
        run(tablet.path(), &["import", "phone", &hex::encode(&delta.bytes)]).unwrap();
        run(phone.path(), &["ack", "tablet", "1"]).unwrap();

        let tablet_app = PokApp::open_dir(tablet.path()).unwrap();
        assert_eq!(tablet_app.status().entries, 2);
        assert_eq!(
            PokApp::open_dir(phone.path()).unwrap().status().peers[0].pending,
            0
        );
    }

    #[test]
    fn conflict_blocks_later_commands_until_cleared() {
        let phone = tempfile::tempdir().unwrap();
        let tablet = tempfile::tempdir().unwrap();
        run(phone.path(), &["record", "phone first"]).unwrap();
        run(tablet.path(), &["record", "tablet first"]).unwrap();

        let delta = PokApp::open_dir(phone.path())
            .unwrap()
            .export_for("tablet")
            .unwrap();
        let hex_delta = hex::encode(&delta.bytes);
        assert!(run(tablet.path(), &["import", "phone", &hex_delta]).is_err());

        // Each command opens a fresh handle.
        assert!(run(tablet.path(), &["record", "tablet second"]).is_err());
        run(tablet.path(), &["status"]).unwrap();
        run(tablet.path(), &["clear-block"]).unwrap();
        run(tablet.path(), &["record", "tablet second"]).unwrap();
        run(tablet.path(), &["--format", "json", "clear-block"]).unwrap();
        assert_eq!(PokApp::open_dir(tablet.path()).unwrap().status().entries, 2);
    }

    #[test]
    fn command_error_wins_over_close_error() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["record", "x"]).unwrap();
        // Cursors cannot be written while their temp path is a directory.
        fs::create_dir(dir.path().join("cursors.json.tmp")).unwrap();

        let err = run(dir.path(), &["reset"]).unwrap_err();
        assert!(format!("{err:#}").contains("refusing to reset"));

        let err = run(dir.path(), &["status"]).unwrap_err();
        assert!(format!("{err:#}").contains("closing ledger"));
    }

    #[test]
    fn import_rejects_bad_hex() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), &["import", "phone", "not-hex"]).is_err());
    }
}
