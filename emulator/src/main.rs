mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use session::{LinkProfile, Session, SessionConfig};

const USAGE: &str = "Usage: rate-control-emulator [--profile <legacy|ht|vht>] [--seed <u64>] [--loss <percent>] [--transcript <path>]";

fn main() -> io::Result<()> {
    let config = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(config)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Rate Control Emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<SessionConfig, String> {
    let mut config = SessionConfig::default();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--profile" => config.profile = Some(LinkProfile::from_tag(&value()?)?),
            "--seed" => {
                let raw = value()?;
                config.seed = raw
                    .parse()
                    .map_err(|_| format!("Invalid seed `{raw}`"))?;
            }
            "--loss" => {
                let raw = value()?;
                config.loss_percent = raw
                    .parse()
                    .ok()
                    .filter(|percent| *percent <= 100)
                    .ok_or_else(|| format!("Loss must be 0-100, got `{raw}`"))?;
            }
            "--transcript" => config.transcript = Some(PathBuf::from(value()?)),
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(ToString::to_string).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn accepts_split_and_inline_values() {
        let config = parse_args(args(&["--profile", "vht", "--seed=17", "--loss", "25"])).unwrap();
        assert_eq!(config.profile, Some(LinkProfile::Vht));
        assert_eq!(config.seed, 17);
        assert_eq!(config.loss_percent, 25);
        assert!(config.transcript.is_none());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(args(&["--profile"])).is_err());
        assert!(parse_args(args(&["--loss=150"])).is_err());
        assert!(parse_args(args(&["--profile=he"])).is_err());
        assert!(parse_args(args(&["reboot"])).is_err());
    }
}
