use std::cell::Cell;
use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEvent},
    terminal,
};
#[cfg(unix)]
use signal_hook::consts::SIGHUP;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Character device the machine talks to, through traps and the keyboard registers.
pub trait Terminal {
    /// Whether a byte can be read without blocking.
    fn key_available(&mut self) -> io::Result<bool>;

    /// Block until one byte is read. Must not echo.
    ///
    /// Returns [`io::ErrorKind::Interrupted`] if the operator asked to stop.
    fn read_byte(&mut self) -> io::Result<u8>;

    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn write_str(&mut self, string: &str) -> io::Result<()> {
        for byte in string.bytes() {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Whether the operator asked to stop the machine.
    fn interrupted(&mut self) -> io::Result<bool> {
        Ok(false)
    }
}

#[cfg(unix)]
const STOP_SIGNALS: &[i32] = &[SIGTERM, SIGHUP, SIGINT];
#[cfg(not(unix))]
const STOP_SIGNALS: &[i32] = &[SIGTERM, SIGINT];

/// How long a blocking read waits before checking for a stop signal again.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Terminal mode is raw while this lives.
///
/// Does nothing if the console is not interactive.
#[must_use]
pub struct RawMode {
    /// Shared with the console, to translate line feeds while raw.
    raw: Option<Rc<Cell<bool>>>,
}

impl RawMode {
    /// Must only be held once at a time.
    pub fn enable(console: &Console) -> io::Result<Self> {
        if !console.is_interactive() {
            return Ok(Self { raw: None });
        }
        debug_assert!(
            !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
            "terminal should not be in raw mode to enable raw mode",
        );
        terminal::enable_raw_mode()?;
        console.raw.set(true);
        Ok(Self {
            raw: Some(Rc::clone(&console.raw)),
        })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let Some(raw) = &self.raw else {
            return;
        };
        if let Err(err) = terminal::disable_raw_mode() {
            log::warn!("failed to restore terminal mode: {err}");
        }
        raw.set(false);
    }
}

/// Process stdin and stdout.
pub struct Console {
    input: Input,
    stdout: io::Stdout,
    stdout_is_terminal: bool,
    /// Whether a [`RawMode`] is active.
    raw: Rc<Cell<bool>>,
    /// Set by a stop signal, once [`Console::watch_signals`] is called.
    stop: Arc<AtomicBool>,
}

enum Input {
    /// Interactive terminal, read through the crossterm event queue.
    Terminal {
        /// Bytes of keys already pressed, not yet read by the machine.
        pending: VecDeque<u8>,
        interrupted: bool,
    },
    /// Stdin which is not attached to a terminal, i.e. piped.
    Piped(Piped),
}

/// Piped input, read on its own thread so that polling never blocks.
struct Piped {
    chunks: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl Piped {
    fn spawn(mut reader: impl Read + Send + 'static) -> Self {
        let (sender, chunks) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0; 256];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(len) => {
                        if sender.send(buf[..len].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::warn!("failed to read stdin: {e}");
                        break;
                    }
                }
            }
        });
        Self {
            chunks,
            pending: VecDeque::new(),
        }
    }

    /// Move everything already read into the pending queue, without blocking.
    fn drain(&mut self) {
        while let Ok(chunk) = self.chunks.try_recv() {
            self.pending.extend(chunk);
        }
    }
}

impl Console {
    pub fn new() -> Self {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            Self::with_input(Input::Terminal {
                pending: VecDeque::new(),
                interrupted: false,
            })
        } else {
            Self::piped(stdin)
        }
    }

    fn piped(reader: impl Read + Send + 'static) -> Self {
        Self::with_input(Input::Piped(Piped::spawn(reader)))
    }

    fn with_input(input: Input) -> Self {
        let stdout = io::stdout();
        Self {
            input,
            stdout_is_terminal: stdout.is_terminal(),
            stdout,
            raw: Rc::new(Cell::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self.input, Input::Terminal { .. })
    }

    /// Stop the machine on SIGTERM, SIGHUP or SIGINT, rather than dying with the terminal raw.
    pub fn watch_signals(&self) -> io::Result<()> {
        for &signal in STOP_SIGNALS {
            flag::register(signal, Arc::clone(&self.stop))?;
        }
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Move every waiting terminal event into the pending queue, without blocking.
    fn pump(&mut self) -> io::Result<()> {
        match &mut self.input {
            Input::Terminal {
                pending,
                interrupted,
            } => {
                while event::poll(Duration::ZERO)? {
                    queue_event(event::read()?, pending, interrupted);
                }
            }
            Input::Piped(piped) => piped.drain(),
        }
        Ok(())
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for Console {
    fn key_available(&mut self) -> io::Result<bool> {
        self.pump()?;
        if self.is_stopped() {
            return Ok(false);
        }
        match &self.input {
            Input::Terminal {
                pending,
                interrupted,
            } => Ok(!*interrupted && !pending.is_empty()),
            Input::Piped(piped) => Ok(!piped.pending.is_empty()),
        }
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let stop = Arc::clone(&self.stop);
        match &mut self.input {
            Input::Terminal {
                pending,
                interrupted,
            } => loop {
                if *interrupted || stop.load(Ordering::Relaxed) {
                    return Err(io::ErrorKind::Interrupted.into());
                }
                if let Some(byte) = pending.pop_front() {
                    return Ok(byte);
                }
                if event::poll(STOP_POLL)? {
                    queue_event(event::read()?, pending, interrupted);
                }
            },
            Input::Piped(piped) => loop {
                if stop.load(Ordering::Relaxed) {
                    return Err(io::ErrorKind::Interrupted.into());
                }
                if let Some(byte) = piped.pending.pop_front() {
                    return Ok(byte);
                }
                match piped.chunks.recv_timeout(STOP_POLL) {
                    Ok(chunk) => piped.pending.extend(chunk),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                }
            },
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let translate = self.raw.get() && self.stdout_is_terminal;
        write_translated(&mut self.stdout, byte, translate)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }

    fn interrupted(&mut self) -> io::Result<bool> {
        self.pump()?;
        Ok(self.is_stopped()
            || matches!(
                self.input,
                Input::Terminal {
                    interrupted: true,
                    ..
                }
            ))
    }
}

/// Raw mode does not translate line feeds on output.
fn write_translated(out: &mut impl Write, byte: u8, raw: bool) -> io::Result<()> {
    if byte == b'\n' && raw {
        out.write_all(b"\r\n")
    } else {
        out.write_all(&[byte])
    }
}

/// Similar to [`crossterm::event::KeyCode`] but only contains relevant information.
#[derive(Debug, PartialEq)]
enum Key {
    Interrupt,
    Bytes(Vec<u8>),
}

fn queue_event(event: Event, pending: &mut VecDeque<u8>, interrupted: &mut bool) {
    let Event::Key(event) = event else {
        return;
    };
    match Key::try_from(event) {
        Ok(Key::Interrupt) => *interrupted = true,
        Ok(Key::Bytes(bytes)) => pending.extend(bytes),
        Err(()) => (),
    }
}

impl TryFrom<KeyEvent> for Key {
    type Error = ();
    fn try_from(event: KeyEvent) -> Result<Self, Self::Error> {
        use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

        if matches!(event.kind, KeyEventKind::Release) {
            return Err(());
        }

        let byte = match (event.modifiers, event.code) {
            (Mod::CONTROL, KeyCode::Char('c')) => return Ok(Key::Interrupt),

            (_, KeyCode::Enter) | (_, KeyCode::Char('\n')) => b'\n',
            (_, KeyCode::Backspace) => 0x08,
            (_, KeyCode::Tab) => b'\t',
            (_, KeyCode::Esc) => 0x1b,
            (_, KeyCode::Delete) => 0x7f,

            // Multi-byte characters are read by the machine one UTF-8 byte at a time
            (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => {
                let mut buf = [0; 4];
                return Ok(Key::Bytes(ch.encode_utf8(&mut buf).as_bytes().to_vec()));
            }

            _ => return Err(()),
        };

        Ok(Key::Bytes(vec![byte]))
    }
}

/// In-memory terminal with a fixed input script.
#[derive(Debug, Default)]
pub struct Scripted {
    input: VecDeque<u8>,
    output: Vec<u8>,
    interrupted: bool,
}

impl Scripted {
    pub fn new(input: impl AsRef<[u8]>) -> Self {
        Self {
            input: input.as_ref().iter().copied().collect(),
            output: Vec::new(),
            interrupted: false,
        }
    }

    /// Behave as if the operator pressed Ctrl+C. Input already queued stays queued.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Bytes of input not yet read.
    pub fn remaining(&self) -> usize {
        self.input.len()
    }
}

impl Terminal for Scripted {
    fn key_available(&mut self) -> io::Result<bool> {
        Ok(!self.input.is_empty())
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        if self.interrupted {
            return Err(io::ErrorKind::Interrupted.into());
        }
        self.input
            .pop_front()
            .ok_or_else(|| io::ErrorKind::UnexpectedEof.into())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn interrupted(&mut self) -> io::Result<bool> {
        Ok(self.interrupted)
    }
}
