//! Interactive console for a receiver
//!
//! ```text
//! cargo run --example console -- 192.168.1.50
//! cargo run --example console -- --config receiver.json
//! RUST_LOG=marantz_avr=debug cargo run --example console -- 192.168.1.50 23
//! ```
//!
//! Type `help` at the prompt for the command list.

use marantz_avr::{AvReceiver, Feedback, ReceiverConfig, SurroundChannel, DEFAULT_PORT};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  on | off | power            power on / standby / toggle
  mute | unmute               mute control
  vol <0-65535>               set master volume (normalized)
  level <fine units>          set master volume (e.g. 455)
  up <ms> | down <ms>         hold volume up/down for <ms>
  input <KEY>                 select input (BD, CD, SAT/CBL, ...)
  inputs                      list inputs
  mode <Key>                  select surround mode (Stereo, DolbyDigital, ...)
  modes                       list surround modes
  cv <TOKEN> <fine units>     set channel level (e.g. cv FL 505)
  cvreset                     reset channel levels
  z2 on|off|mute|unmute       zone 2 control
  z2 input <KEY>              zone 2 source
  raw <TEXT>                  send a raw command
  status                      print state as JSON
  quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marantz_avr=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let receiver = match args.as_slice() {
        [flag, path] if flag == "--config" => {
            AvReceiver::connect_from_config(ReceiverConfig::from_file(path)?).await?
        }
        [host] => AvReceiver::connect(host, DEFAULT_PORT, ReceiverConfig::default()).await?,
        [host, port] => {
            AvReceiver::connect(host, port.parse()?, ReceiverConfig::default()).await?
        }
        _ => {
            eprintln!("usage: console <host> [port] | console --config <file>");
            std::process::exit(2);
        }
    };

    let mut feedback = receiver.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = feedback.recv().await {
            match update {
                Feedback::Volume { level, normalized } => {
                    println!("< volume {} ({})", level, normalized)
                }
                Feedback::ChannelVolume { channel, level, .. } => {
                    println!("< {} {}", channel, level)
                }
                other => println!("< {:?}", other),
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"quit") {
            break;
        }
        if let Err(e) = run_command(&receiver, &words).await {
            println!("! {}", e);
        }
    }

    receiver.shutdown();
    Ok(())
}

async fn run_command(
    receiver: &AvReceiver,
    words: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    match words {
        [] => {}
        ["help"] => println!("{}", HELP),
        ["on"] => receiver.power_on()?,
        ["off"] => receiver.power_off()?,
        ["power"] => receiver.power_toggle()?,
        ["mute"] => receiver.mute_on()?,
        ["unmute"] => receiver.mute_off()?,
        ["vol", value] => receiver.set_volume(value.parse()?)?,
        ["level", value] => receiver.set_volume_level(value.parse()?)?,
        ["up", ms] => {
            receiver.volume_up(true);
            tokio::time::sleep(Duration::from_millis(ms.parse()?)).await;
            receiver.volume_up(false);
        }
        ["down", ms] => {
            receiver.volume_down(true);
            tokio::time::sleep(Duration::from_millis(ms.parse()?)).await;
            receiver.volume_down(false);
        }
        ["input", key] => receiver.select_input(&key.to_ascii_uppercase())?,
        ["inputs"] => {
            for item in receiver.inputs() {
                let mark = if item.is_selected { "*" } else { " " };
                println!("{} {:<8} {}", mark, item.key, item.name);
            }
        }
        ["mode", key] => receiver.select_surround_mode_by_key(key)?,
        ["modes"] => {
            for item in receiver.surround_modes() {
                let mark = if item.is_selected { "*" } else { " " };
                println!("{} {:?}", mark, item.key);
            }
        }
        ["cv", token, value] => {
            let channel = SurroundChannel::from_token(token);
            receiver.set_channel_volume(channel, value.parse()?)?;
        }
        ["cvreset"] => receiver.reset_channel_levels()?,
        ["z2", rest @ ..] => {
            let Some(zone2) = receiver.zone2() else {
                println!("! zone 2 is not enabled");
                return Ok(());
            };
            match rest {
                ["on"] => zone2.power_on()?,
                ["off"] => zone2.power_off()?,
                ["mute"] => zone2.mute_on()?,
                ["unmute"] => zone2.mute_off()?,
                ["input", key] => zone2.select_input(key)?,
                _ => println!("! unknown zone 2 command"),
            }
        }
        ["raw", text @ ..] => receiver.send_text(&text.join(" "))?,
        ["status"] => {
            let json = receiver.state_snapshot().to_json()?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => println!("! unknown command, try `help`"),
    }
    Ok(())
}
