use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};
use xcb::{dpms, x, Connection};

use super::{DisplayPower, DisplaySampler};

/// Queries the display power state through the DPMS extension.
pub struct X11DisplaySampler {
    connection: Connection,
}

impl X11DisplaySampler {
    pub fn new() -> Result<Self> {
        let (connection, _) = xcb::Connection::connect(None)?;
        Ok(Self { connection })
    }
}

impl DisplaySampler for X11DisplaySampler {
    #[instrument(skip(self))]
    fn power_state(&mut self) -> Result<DisplayPower> {
        let reply = self
            .connection
            .wait_for_reply(self.connection.send_request(&dpms::Info {}))?;

        // DPMS disabled means the server never powers the display down.
        if !reply.state() {
            return Ok(DisplayPower::On);
        }

        Ok(match reply.power_level() {
            dpms::DpmsMode::On => DisplayPower::On,
            dpms::DpmsMode::Standby => DisplayPower::Standby,
            dpms::DpmsMode::Suspend => DisplayPower::Suspend,
            dpms::DpmsMode::Off => DisplayPower::Off,
        })
    }
}

/// How often the key poller diffs the server keymap. Coarse enough to stay
/// cheap, fine enough that ordinary typing is not missed.
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Spawns a dedicated thread that polls the X server keymap bitmap and sends
/// a normalized label for every newly pressed keycode. A polling listener
/// avoids the record-extension setup and cannot block the X event queue.
pub fn spawn_key_listener(
    sender: UnboundedSender<String>,
    shutdown: CancellationToken,
) -> Result<()> {
    std::thread::Builder::new()
        .name("daylog-keys".into())
        .spawn(move || {
            if let Err(e) = poll_keymap(sender, shutdown) {
                error!("Key listener stopped with an error {e:?}");
            }
        })?;
    Ok(())
}

fn poll_keymap(sender: UnboundedSender<String>, shutdown: CancellationToken) -> Result<()> {
    let (conn, _) = xcb::Connection::connect(None)?;

    let setup = conn.get_setup();
    let min_keycode = setup.min_keycode();
    let max_keycode = setup.max_keycode();

    let mapping = conn.wait_for_reply(conn.send_request(&x::GetKeyboardMapping {
        first_keycode: min_keycode,
        count: max_keycode - min_keycode + 1,
    }))?;
    let keysyms = mapping.keysyms().to_vec();
    let per_keycode = mapping.keysyms_per_keycode() as usize;

    let mut previous = [0u8; 32];
    loop {
        if shutdown.is_cancelled() {
            debug!("Key listener shutting down");
            return Ok(());
        }

        let reply = conn.wait_for_reply(conn.send_request(&x::QueryKeymap {}))?;
        let current = reply.keys();

        for (index, (now, before)) in current.iter().zip(previous.iter()).enumerate() {
            let pressed = now & !before;
            if pressed == 0 {
                continue;
            }
            for bit in 0..8 {
                if pressed & (1 << bit) == 0 {
                    continue;
                }
                let keycode = (index * 8 + bit) as u8;
                if keycode < min_keycode {
                    continue;
                }
                let sym_index = (keycode - min_keycode) as usize * per_keycode;
                let keysym = keysyms.get(sym_index).copied().unwrap_or(0);
                if sender.send(key_label(keysym, keycode)).is_err() {
                    // Receiver gone, the monitor has stopped.
                    return Ok(());
                }
            }
        }
        previous.copy_from_slice(current);

        std::thread::sleep(KEY_POLL_INTERVAL);
    }
}

/// Maps an unshifted keysym to the normalized label stored in the log.
fn key_label(keysym: u32, keycode: u8) -> String {
    match keysym {
        0x0020 => "space".into(),
        0xff0d | 0xff8d => "enter".into(),
        0xff1b => "esc".into(),
        0xff09 => "tab".into(),
        0xff08 => "backspace".into(),
        0xffff => "delete".into(),
        0xffe1 | 0xffe2 => "shift".into(),
        0xffe3 | 0xffe4 => "ctrl".into(),
        0xffe9 | 0xffea => "alt".into(),
        0xffeb | 0xffec => "cmd".into(),
        0xffe5 => "caps_lock".into(),
        0xff51 => "left".into(),
        0xff52 => "up".into(),
        0xff53 => "right".into(),
        0xff54 => "down".into(),
        0xff50 => "home".into(),
        0xff57 => "end".into(),
        0xff55 => "page_up".into(),
        0xff56 => "page_down".into(),
        0xffbe..=0xffc9 => format!("f{}", keysym - 0xffbd),
        // Printable latin-1 range maps straight to its character.
        0x0021..=0x007e => char::from_u32(keysym)
            .map(|c| c.to_ascii_lowercase().to_string())
            .unwrap_or_else(|| format!("keysym_{keysym:#x}")),
        0 => format!("keycode_{keycode}"),
        _ => format!("keysym_{keysym:#x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::key_label;

    #[test]
    fn test_key_labels() {
        assert_eq!(key_label(0x0061, 38), "a");
        assert_eq!(key_label(0x0041, 38), "a");
        assert_eq!(key_label(0x0020, 65), "space");
        assert_eq!(key_label(0xff0d, 36), "enter");
        assert_eq!(key_label(0xffbe, 67), "f1");
        assert_eq!(key_label(0xffc9, 96), "f12");
        assert_eq!(key_label(0, 255), "keycode_255");
    }
}
