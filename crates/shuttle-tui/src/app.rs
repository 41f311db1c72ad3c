//! App: terminal front end.
//!
//! Architecture:
//! - The controller publishes `PlayerState` snapshots on a `watch` channel;
//!   the App keeps the latest one and redraws from it.
//! - Keys become `Action`s, and Actions become `Intent`s sent to the
//!   controller over its event channel. No playback logic lives here.

use std::io;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Paragraph, Tabs},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use shuttle_core::{Catalog, ControllerEvent, Intent, PlaybackPhase, PlayerState};

use crate::action::Action;
use crate::theme::{
    style_border, style_brand, style_default, style_hint, style_muted, style_secondary,
    style_selected, style_title, C_CONNECTING, C_MUTED, C_PLAYING, C_SECONDARY,
};

const TAGLINE: &str = "The #1 Radio Station for Progressive Rock";
const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

pub struct App {
    catalog: Catalog,
    state: PlayerState,
    cmd_tx: mpsc::Sender<ControllerEvent>,
    spinner_frame: usize,
    should_quit: bool,
}

impl App {
    pub fn new(catalog: Catalog, state: PlayerState, cmd_tx: mpsc::Sender<ControllerEvent>) -> Self {
        Self {
            catalog,
            state,
            cmd_tx,
            spinner_frame: 0,
            should_quit: false,
        }
    }

    pub async fn run(mut self, mut state_rx: watch::Receiver<PlayerState>) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = match Terminal::new(backend) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                return Err(e.into());
            }
        };

        let result = self.event_loop(&mut terminal, &mut state_rx).await;

        // ── Teardown ──────────────────────────────────────────────────────────
        finish(result, || restore_terminal(&mut terminal))
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        state_rx: &mut watch::Receiver<PlayerState>,
    ) -> anyhow::Result<()> {
        // ── Background task: terminal events ─────────────────────────────────
        let (key_tx, mut key_rx) = mpsc::channel::<Event>(64);
        tokio::task::spawn_blocking(move || {
            while !key_tx.is_closed() {
                match event::poll(Duration::from_millis(200)) {
                    Ok(true) => match event::read() {
                        Ok(ev) => {
                            if key_tx.blocking_send(ev).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    },
                    Ok(false) => {}
                    Err(_) => break,
                }
            }
        });

        // Spinner animation while loading
        let mut spinner_tick = tokio::time::interval(Duration::from_millis(100));
        spinner_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(ev) = key_rx.recv() => {
                    if let Event::Key(key) = ev {
                        for action in self.handle_key(key) {
                            self.dispatch(action).await;
                        }
                    }
                    needs_redraw = true;
                }

                changed = state_rx.changed() => {
                    match changed {
                        Ok(()) => self.state = state_rx.borrow_and_update().clone(),
                        Err(_) => {
                            info!("controller closed its state channel");
                            self.should_quit = true;
                        }
                    }
                    needs_redraw = true;
                }

                _ = spinner_tick.tick() => {
                    if self.state.is_loading {
                        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
                        needs_redraw = true;
                    }
                }
            }
        }

        Ok(())
    }

    // ── Key handling ──────────────────────────────────────────────────────────

    fn handle_key(&self, key: KeyEvent) -> Vec<Action> {
        if key.kind != KeyEventKind::Press {
            return vec![];
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                vec![Action::Quit]
            }
            KeyCode::Char('q') => vec![Action::Quit],
            KeyCode::Char(' ') | KeyCode::Char('p') => vec![Action::TogglePause],
            KeyCode::Char('s') => vec![Action::Stop],
            KeyCode::Char('r') => vec![Action::Refresh],
            KeyCode::Right | KeyCode::Tab => vec![Action::Next],
            KeyCode::Left | KeyCode::BackTab => vec![Action::Prev],
            KeyCode::Char(c @ '1'..='9') => {
                let idx = c as usize - '1' as usize;
                if self.catalog.get_index(idx).is_some() {
                    vec![Action::Select(idx)]
                } else {
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    fn intent_for(&self, action: Action) -> Option<Intent> {
        let current = &self.state.current_station.name;
        match action {
            Action::Select(idx) => self
                .catalog
                .get_index(idx)
                .map(|s| Intent::SelectStation(s.name.clone())),
            Action::Next => Some(Intent::SelectStation(
                self.catalog.cycle(current, 1).name.clone(),
            )),
            Action::Prev => Some(Intent::SelectStation(
                self.catalog.cycle(current, -1).name.clone(),
            )),
            Action::Refresh => Some(Intent::Refresh),
            Action::TogglePause => Some(Intent::PlayPause),
            Action::Stop => Some(Intent::Stop),
            Action::Quit => None,
        }
    }

    async fn dispatch(&mut self, action: Action) {
        debug!("action {:?}", action);
        if action == Action::Quit {
            self.should_quit = true;
            return;
        }
        let Some(intent) = self.intent_for(action) else {
            return;
        };
        if self.cmd_tx.send(ControllerEvent::Intent(intent)).await.is_err() {
            warn!("controller channel closed");
            self.should_quit = true;
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&self, frame: &mut Frame) {
        let [header, tabs, body, hints] = Layout::vertical([
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Min(7),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        frame.render_widget(
            Paragraph::new(vec![
                Line::from(Span::styled("Prog Radio Shuttle", style_brand())),
                Line::from(Span::styled(TAGLINE, style_secondary())),
            ]),
            header,
        );

        self.draw_tabs(frame, tabs);
        self.draw_now_playing(frame, body);

        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                "1-3 station  ←/→ cycle  space play/pause  r refresh  s stop  q quit",
                style_hint(),
            ))),
            hints,
        );
    }

    fn draw_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<Line> = self
            .catalog
            .stations()
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Line::from(vec![
                    Span::styled(format!("{} ", i + 1), style_hint()),
                    Span::raw(s.name.clone()),
                ])
            })
            .collect();
        let selected = self.catalog.position(&self.state.current_station.name);
        let tabs = Tabs::new(titles)
            .select(selected)
            .style(style_secondary())
            .highlight_style(style_selected())
            .divider(Span::styled("│", style_muted()));
        frame.render_widget(tabs, area);
    }

    fn draw_now_playing(&self, frame: &mut Frame, area: Rect) {
        let block = Block::bordered()
            .border_style(style_border())
            .title(Line::from(format!(" {} ", self.state.current_station.name)));
        let width = area.width.saturating_sub(4) as usize;

        let artwork = match &self.state.artwork_url {
            Some(url) => Span::styled(format!("▣ {}", truncate(url.as_str(), width.saturating_sub(2))), style_muted()),
            None => Span::styled("♪ no artwork", style_muted()),
        };

        let (glyph, glyph_style) = self.status_glyph();
        let status = Line::from(vec![
            Span::styled(glyph, glyph_style),
            Span::raw(" "),
            Span::styled(self.status_label(), style_secondary()),
        ]);

        let mut lines = vec![Line::from(artwork), Line::raw(""), status];
        if self.state.has_metadata() {
            lines.push(Line::from(Span::styled(truncate(&self.state.title, width), style_title())));
            lines.push(Line::from(Span::styled(truncate(&self.state.artist, width), style_secondary())));
        } else {
            lines.push(Line::from(Span::styled("Waiting for track info…", style_default())));
        }

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn status_glyph(&self) -> (&'static str, Style) {
        if self.state.is_loading {
            (SPINNER_FRAMES[self.spinner_frame], Style::default().fg(C_CONNECTING))
        } else if self.state.is_playing {
            ("▶", Style::default().fg(C_PLAYING))
        } else if self.state.phase == PlaybackPhase::Paused {
            ("⏸", Style::default().fg(C_SECONDARY))
        } else {
            ("■", Style::default().fg(C_MUTED))
        }
    }

    fn status_label(&self) -> &'static str {
        if self.state.is_loading {
            PlaybackPhase::Starting.label()
        } else {
            self.state.phase.label()
        }
    }
}

/// Cut `s` to at most `max_width` terminal columns, ending in `…` when shortened.
pub fn truncate(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max_width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Run `teardown` whatever `result` is. The loop's own error takes
/// precedence over a teardown failure.
fn finish<T>(
    result: anyhow::Result<T>,
    teardown: impl FnOnce() -> anyhow::Result<()>,
) -> anyhow::Result<T> {
    match (result, teardown()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown_err)) => {
            warn!("terminal teardown failed: {}", teardown_err);
            Err(e)
        }
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEventState;

    fn app() -> (App, mpsc::Receiver<ControllerEvent>) {
        let catalog = Catalog::builtin().unwrap();
        let state = PlayerState::new(catalog.first().clone());
        let (tx, rx) = mpsc::channel(8);
        (App::new(catalog, state, tx), rx)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn maps_playback_keys() {
        let (app, _rx) = app();
        assert_eq!(app.handle_key(press(KeyCode::Char(' '))), vec![Action::TogglePause]);
        assert_eq!(app.handle_key(press(KeyCode::Char('p'))), vec![Action::TogglePause]);
        assert_eq!(app.handle_key(press(KeyCode::Char('s'))), vec![Action::Stop]);
        assert_eq!(app.handle_key(press(KeyCode::Char('r'))), vec![Action::Refresh]);
        assert_eq!(app.handle_key(press(KeyCode::Char('q'))), vec![Action::Quit]);
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            vec![Action::Quit]
        );
    }

    #[test]
    fn number_keys_only_cover_the_catalog() {
        let (app, _rx) = app();
        assert_eq!(app.handle_key(press(KeyCode::Char('1'))), vec![Action::Select(0)]);
        assert_eq!(app.handle_key(press(KeyCode::Char('3'))), vec![Action::Select(2)]);
        assert!(app.handle_key(press(KeyCode::Char('4'))).is_empty());
    }

    #[test]
    fn key_releases_are_ignored() {
        let (app, _rx) = app();
        let release = KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert!(app.handle_key(release).is_empty());
    }

    #[test]
    fn arrows_cycle_through_stations() {
        let (app, _rx) = app();
        assert_eq!(app.handle_key(press(KeyCode::Right)), vec![Action::Next]);
        assert_eq!(app.handle_key(press(KeyCode::Tab)), vec![Action::Next]);
        assert_eq!(
            app.intent_for(Action::Next),
            Some(Intent::SelectStation("Wizard’s Forest".into()))
        );
        assert_eq!(
            app.intent_for(Action::Prev),
            Some(Intent::SelectStation("Dragon’s Tower".into()))
        );
        assert_eq!(app.intent_for(Action::Quit), None);
    }

    #[tokio::test]
    async fn dispatch_sends_intents() {
        let (mut app, mut rx) = app();
        app.dispatch(Action::Select(2)).await;
        app.dispatch(Action::TogglePause).await;
        assert!(matches!(
            rx.recv().await,
            Some(ControllerEvent::Intent(Intent::SelectStation(name))) if name == "Dragon’s Tower"
        ));
        assert!(matches!(
            rx.recv().await,
            Some(ControllerEvent::Intent(Intent::PlayPause))
        ));

        app.dispatch(Action::Quit).await;
        assert!(app.should_quit);
    }

    #[test]
    fn teardown_runs_after_a_failed_loop() {
        let mut restored = false;
        let result: anyhow::Result<()> = finish(Err(anyhow::anyhow!("draw failed")), || {
            restored = true;
            Ok(())
        });
        assert!(restored);
        assert_eq!(result.unwrap_err().to_string(), "draw failed");

        let result = finish(Err::<(), _>(anyhow::anyhow!("draw failed")), || {
            Err(anyhow::anyhow!("still in raw mode"))
        });
        assert_eq!(result.unwrap_err().to_string(), "draw failed");

        let result = finish(Ok(()), || Err(anyhow::anyhow!("still in raw mode")));
        assert!(result.is_err());
    }

    #[test]
    fn truncates_by_display_width() {
        assert_eq!(truncate("Tom Sawyer", 20), "Tom Sawyer");
        assert_eq!(truncate("Tom Sawyer", 5), "Tom …");
        assert_eq!(truncate("日本語タイトル", 5), "日本…");
        assert_eq!(truncate("abc", 0), "");
    }
}
