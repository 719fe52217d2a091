//! Interactive line editor: a single-threaded, cooperative terminal
//! input loop built on the pure contracts in [`crate::wrap`],
//! [`crate::paste`], and [`crate::history`]. Uses an RAII raw-mode guard
//! (enable on construction, restore on every exit path including unwind)
//! built on `crossterm`'s typed terminal API.

use std::collections::VecDeque;
use std::io::{self, Write, stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use claudec_domain::InterruptBus;
use crossterm::event::{
    DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEventKind, KeyModifiers,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{cursor, execute, terminal};

use crate::history::History;
use crate::paste::{self, PasteSanitizeOptions};
use crate::wrap::{self, visible_width};

/// Enables raw mode and bracketed paste for the process lifetime, restoring
/// both on drop — including on the unwind path, so a panicking turn never
/// leaves the user's shell in raw mode.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(stdout(), EnableBracketedPaste)?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), DisableBracketedPaste);
        let _ = disable_raw_mode();
    }
}

/// One line read from the editor, or the reason reading stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Submitted(String),
    /// ESC pressed on an empty buffer, or ESC pressed twice: cancel this
    /// line and return to a fresh prompt.
    Cancelled,
    /// Ctrl+D on an empty buffer, or Ctrl+C: end the session.
    Eof,
}

/// Bounded FIFO of terminal events read ahead of when the editor was ready
/// to process them, so nothing typed during a redraw
/// or a paste burst is lost. In interactive use `LineEditor::next_event`
/// drains this first and falls back to a live `crossterm::event::read`;
/// tests drive the queue directly without a tty.
pub struct InputQueue {
    buf: VecDeque<Event>,
    capacity: usize,
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        Self { buf: VecDeque::with_capacity(capacity.min(256)), capacity: capacity.max(1) }
    }

    pub fn push(&mut self, event: Event) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.buf.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }
}

pub struct LineEditorConfig {
    pub prompt: String,
    pub history_capacity: usize,
    pub input_queue_capacity: usize,
    pub paste_preview_chars: usize,
    pub paste_options: PasteSanitizeOptions,
}

impl Default for LineEditorConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            history_capacity: 500,
            input_queue_capacity: 256,
            paste_preview_chars: 80,
            paste_options: PasteSanitizeOptions::default(),
        }
    }
}

pub struct LineEditor {
    config: LineEditorConfig,
    buffer: String,
    cursor: usize,
    history: History,
    saved_live: Option<String>,
    queue: InputQueue,
}

impl LineEditor {
    pub fn new(config: LineEditorConfig) -> Self {
        let history = History::new(config.history_capacity);
        let queue = InputQueue::new(config.input_queue_capacity);
        Self { config, buffer: String::new(), cursor: 0, history, saved_live: None, queue }
    }

    /// Queues an event ahead of the live terminal, for tests or for a
    /// caller that peeked at input during a redraw.
    pub fn queue_event(&mut self, event: Event) {
        self.queue.push(event);
    }

    fn next_event(&mut self) -> io::Result<Event> {
        if let Some(event) = self.queue.pop() {
            return Ok(event);
        }
        crossterm::event::read()
    }

    fn insert(&mut self, text: &str) {
        self.buffer.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    fn delete_backward(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = wrap::prev_char_boundary(&self.buffer, self.cursor);
        self.buffer.replace_range(start..self.cursor, "");
        self.cursor = start;
    }

    fn delete_forward(&mut self) {
        if self.cursor >= self.buffer.len() {
            return;
        }
        let end = wrap::next_char_boundary(&self.buffer, self.cursor);
        self.buffer.replace_range(self.cursor..end, "");
    }

    fn enter_history(&mut self, entry: Option<&str>) {
        if let Some(entry) = entry {
            self.buffer = entry.to_string();
            self.cursor = self.buffer.len();
        }
    }

    fn history_up(&mut self) {
        if self.history.is_live() {
            self.saved_live = Some(self.buffer.clone());
        }
        let entry = self.history.up().map(str::to_string);
        self.enter_history(entry.as_deref());
    }

    fn history_down(&mut self) {
        match self.history.down() {
            Some(entry) => self.enter_history(Some(&entry)),
            None => {
                let restored = self.saved_live.take().unwrap_or_default();
                self.buffer = restored;
                self.cursor = self.buffer.len();
            }
        }
    }

    fn redraw(&self) -> io::Result<()> {
        let mut out = stdout();
        let (width, _) = terminal::size().unwrap_or((80, 24));
        execute!(out, cursor::MoveToColumn(0), terminal::Clear(terminal::ClearType::FromCursorDown))?;
        write!(out, "{}{}", self.config.prompt, self.buffer)?;

        let prompt_width = visible_width(&self.config.prompt);
        let end = wrap::compute_wrap(&self.buffer, self.buffer.len(), prompt_width, width as usize);
        let at_cursor = wrap::compute_wrap(&self.buffer, self.cursor, prompt_width, width as usize);
        if at_cursor.cursor_line < end.cursor_line {
            execute!(out, cursor::MoveUp((end.cursor_line - at_cursor.cursor_line) as u16))?;
        }
        execute!(out, cursor::MoveToColumn(at_cursor.cursor_column as u16))?;
        out.flush()
    }

    fn show_paste_preview(&self, sanitized: &str) -> io::Result<()> {
        let preview = paste::preview(sanitized, self.config.paste_preview_chars);
        let mut out = stdout();
        write!(out, "\r\n[pasted: {preview}]\r\n")?;
        out.flush()
    }

    /// Blocks reading keys until a line is submitted, the line is
    /// cancelled, or the session should end. Assumes raw mode and
    /// bracketed paste are already enabled ([`RawModeGuard`]).
    pub fn read_line(&mut self) -> anyhow::Result<ReadOutcome> {
        self.buffer.clear();
        self.cursor = 0;
        self.redraw()?;

        loop {
            let event = self.next_event()?;
            let outcome = match event {
                Event::Paste(text) => {
                    let sanitized = paste::sanitize(&text, &self.config.paste_options);
                    self.insert(&sanitized);
                    self.show_paste_preview(&sanitized)?;
                    None
                }
                Event::Key(key) if key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat => {
                    self.handle_key(key.code, key.modifiers)?
                }
                _ => None,
            };
            if let Some(outcome) = outcome {
                write!(stdout(), "\r\n")?;
                stdout().flush()?;
                if let ReadOutcome::Submitted(line) = &outcome {
                    self.history.push(line.clone());
                }
                return Ok(outcome);
            }
            self.redraw()?;
        }
    }

    fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
    ) -> anyhow::Result<Option<ReadOutcome>> {
        match code {
            KeyCode::Enter if modifiers.contains(KeyModifiers::ALT) || modifiers.contains(KeyModifiers::SHIFT) => {
                self.insert("\n");
                Ok(None)
            }
            KeyCode::Enter => Ok(Some(ReadOutcome::Submitted(std::mem::take(&mut self.buffer)))),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Ok(Some(ReadOutcome::Eof)),
            KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) && self.buffer.is_empty() => {
                Ok(Some(ReadOutcome::Eof))
            }
            KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
                let mut tmp = [0u8; 4];
                self.insert(c.encode_utf8(&mut tmp));
                Ok(None)
            }
            KeyCode::Backspace => {
                self.delete_backward();
                Ok(None)
            }
            KeyCode::Delete => {
                self.delete_forward();
                Ok(None)
            }
            KeyCode::Left if modifiers.contains(KeyModifiers::CONTROL) => {
                self.cursor = wrap::backward_word(&self.buffer, self.cursor);
                Ok(None)
            }
            KeyCode::Right if modifiers.contains(KeyModifiers::CONTROL) => {
                self.cursor = wrap::forward_word(&self.buffer, self.cursor);
                Ok(None)
            }
            KeyCode::Left => {
                self.cursor = wrap::prev_char_boundary(&self.buffer, self.cursor);
                Ok(None)
            }
            KeyCode::Right => {
                self.cursor = wrap::next_char_boundary(&self.buffer, self.cursor);
                Ok(None)
            }
            KeyCode::Home => {
                self.cursor = 0;
                Ok(None)
            }
            KeyCode::End => {
                self.cursor = self.buffer.len();
                Ok(None)
            }
            KeyCode::Up => {
                self.history_up();
                Ok(None)
            }
            KeyCode::Down => {
                self.history_down();
                Ok(None)
            }
            KeyCode::Esc if self.buffer.is_empty() => Ok(Some(ReadOutcome::Cancelled)),
            KeyCode::Esc => {
                self.buffer.clear();
                self.cursor = 0;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

/// Watches the terminal for ESC/Ctrl+C while the line editor itself isn't
/// reading — i.e. while a provider call or tool dispatch is in flight — and
/// sets the shared [`InterruptBus`]. The editor and this watcher never read
/// the terminal at the same time: the CLI loop starts the watcher only
/// around `Api::send`, keeping exactly one reader of the terminal fd live
/// at any moment.
pub struct InterruptWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InterruptWatcher {
    pub fn spawn(interrupt: InterruptBus) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_reader = stop.clone();
        let handle = std::thread::spawn(move || {
            while !stop_reader.load(Ordering::Acquire) {
                match crossterm::event::poll(Duration::from_millis(50)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key)) = crossterm::event::read() {
                            let is_esc = key.code == KeyCode::Esc;
                            let is_ctrl_c =
                                key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
                            if is_esc || is_ctrl_c {
                                interrupt.request();
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(_) => break,
                }
            }
        });
        Self { stop, handle: Some(handle) }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InterruptWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyEvent;
    use pretty_assertions::assert_eq;

    use super::*;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::empty()))
    }

    fn editor() -> LineEditor {
        LineEditor::new(LineEditorConfig::default())
    }

    #[test]
    fn input_queue_is_fifo_and_bounded() {
        let mut q = InputQueue::new(2);
        q.push(key(KeyCode::Char('a')));
        q.push(key(KeyCode::Char('b')));
        q.push(key(KeyCode::Char('c')));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(key(KeyCode::Char('b'))));
        assert_eq!(q.pop(), Some(key(KeyCode::Char('c'))));
        assert!(q.pop().is_none());
    }

    #[test]
    fn typing_and_enter_submits_queued_events_without_a_tty() {
        let mut ed = editor();
        for c in "hi".chars() {
            ed.queue_event(key(KeyCode::Char(c)));
        }
        ed.queue_event(Event::Key(KeyEvent::new(KeyCode::Enter, KeyModifiers::empty())));

        // Drain manually via handle_key to avoid touching a real terminal
        // (read_line's redraw() needs a tty); exercise the same state
        // machine read_line drives.
        let mut outcome = None;
        while outcome.is_none() {
            let Event::Key(k) = ed.queue.pop().expect("queued events exhausted before Enter") else {
                continue;
            };
            outcome = ed.handle_key(k.code, k.modifiers).unwrap();
        }
        assert_eq!(outcome, Some(ReadOutcome::Submitted("hi".to_string())));
    }

    #[test]
    fn backspace_removes_whole_utf8_code_point() {
        let mut ed = editor();
        ed.insert("a\u{00e9}");
        ed.delete_backward();
        assert_eq!(ed.buffer, "a");
    }

    #[test]
    fn esc_on_empty_buffer_cancels() {
        let mut ed = editor();
        let outcome = ed.handle_key(KeyCode::Esc, KeyModifiers::empty()).unwrap();
        assert_eq!(outcome, Some(ReadOutcome::Cancelled));
    }

    #[test]
    fn esc_on_nonempty_buffer_clears_it_first() {
        let mut ed = editor();
        ed.insert("draft");
        let outcome = ed.handle_key(KeyCode::Esc, KeyModifiers::empty()).unwrap();
        assert!(outcome.is_none());
        assert!(ed.buffer.is_empty());
    }

    #[test]
    fn ctrl_c_ends_the_session() {
        let mut ed = editor();
        let outcome = ed.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL).unwrap();
        assert_eq!(outcome, Some(ReadOutcome::Eof));
    }

    #[test]
    fn history_round_trip_restores_saved_live_buffer() {
        let mut ed = editor();
        ed.history.push("earlier");
        ed.insert("draft");
        ed.history_up();
        assert_eq!(ed.buffer, "earlier");
        ed.history_down();
        assert_eq!(ed.buffer, "draft");
    }
}
