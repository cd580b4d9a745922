use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{LinkProfile, Session, SessionConfig};

fn main() -> io::Result<()> {
    for profile in LinkProfile::ALL {
        record_profile(profile)?;
    }
    Ok(())
}

fn record_profile(profile: LinkProfile) -> io::Result<()> {
    let mut session = Session::new(SessionConfig {
        profile: Some(profile),
        transcript: Some(profile.log_path()),
        ..SessionConfig::default()
    })?;
    match profile {
        LinkProfile::Legacy => record_legacy(&mut session),
        LinkProfile::Ht => record_ht(&mut session),
        LinkProfile::Vht => record_vht(&mut session),
    }
}

fn record_legacy(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("help")?;
    let _ = session.handle_command("run 10")?;
    let _ = session.handle_command("stats sta0")?;
    let _ = session.handle_command("loss sta0 60")?;
    let _ = session.handle_command("run 20")?;
    let _ = session.handle_command("stats sta0")?;
    Ok(())
}

fn record_ht(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("assoc legacy")?;
    let _ = session.handle_command("run 10")?;
    let _ = session.handle_command("fixed sta0 ht mcs=3 bw=20")?;
    let _ = session.handle_command("run 5")?;
    let _ = session.handle_command("stats sta0")?;
    let _ = session.handle_command("auto sta0")?;
    let _ = session.handle_command("drop sta1")?;
    let _ = session.handle_command("run 5")?;
    let _ = session.handle_command("show")?;
    Ok(())
}

fn record_vht(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("run 10")?;
    let _ = session.handle_command("fixed sta0 vht mcs=9 nss=1 bw=20")?;
    let _ = session.handle_command("fixed sta0 vht mcs=9 nss=1 bw=80 sgi=1")?;
    let _ = session.handle_command("loss sta0 100")?;
    let _ = session.handle_command("run 3")?;
    let _ = session.handle_command("auto sta0")?;
    let _ = session.handle_command("loss sta0 0")?;
    let _ = session.handle_command("run 10")?;
    let _ = session.handle_command("stats sta0")?;
    Ok(())
}
