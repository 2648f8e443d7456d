//! Attach to a server console described by a target JSON file and mirror it
//! on the terminal. Lines typed on stdin are sent as console commands.
//!
//! ```text
//! RUST_LOG=info cargo run -p mcpanel-console --example attach -- target.json
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, bail};
use mcpanel_console::{
    ConsoleEvent, ConsoleManager, ConsoleOptions, TargetConfig, TargetId,
};

#[cfg(unix)]
fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: attach <target.json> [options.json]");
    };
    let config = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {path}"))?;
    let config = TargetConfig::from_json(&config).context("invalid target")?;

    let options = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {path}"))?;
            ConsoleOptions::from_json(&json).context("invalid options")?
        },
        None => ConsoleOptions::default(),
    };

    let manager = Arc::new(ConsoleManager::new(options));
    let id = TargetId::from("console");
    manager.register(id.clone(), config);

    let events = manager.subscribe_events(&id)?;
    let messages = manager.subscribe_messages(&id)?;

    thread::spawn(move || {
        for message in messages.iter() {
            eprintln!("[bridge] {message:?}");
        }
    });

    // Every connection gets a fresh output stream, so follow the lifecycle
    // events and resubscribe after each (re)connect.
    {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        thread::spawn(move || {
            for event in events.iter() {
                match event {
                    ConsoleEvent::Connected => {
                        let Ok(output) = manager.subscribe_output(&id) else {
                            continue;
                        };
                        thread::spawn(move || {
                            let mut stdout = io::stdout();
                            for chunk in output.iter() {
                                let _ = stdout.write_all(chunk.text.as_bytes());
                                let _ = stdout.flush();
                            }
                        });
                    },
                    other => eprintln!("[console] {other:?}"),
                }
            }
        });
    }

    manager.connect(&id).context("failed to connect")?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        if let Err(err) = manager.send_command(&id, &line) {
            eprintln!("[console] {err}");
        }
    }

    manager.disconnect(&id)?;
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("attach example is only supported on unix platforms");
}
