//! Frequency, waveform, and level-meter rendering.
//!
//! The render loop is the only repeating task on the visualization side. It
//! runs `Idle → Running → Stopped`, drawing one frame per tick and checking
//! its cancellation flag before every reschedule. Draw cost directly bounds
//! the achievable frame rate; nothing preempts a tick.

use crossterm::event::{KeyCode, KeyModifiers};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analyzer::mean_level;
use crate::config::{VizConfig, OSC_FREQ_MAX_HZ, OSC_FREQ_MIN_HZ};
use crate::debuglog::{dbg_log, DebugLogger};
use crate::graph::GraphHandles;
use crate::host::AudioHost;
use crate::session::{
    Session, LEFT_GAIN, LEFT_OSCILLATOR, RIGHT_GAIN, RIGHT_OSCILLATOR,
};
use crate::surface::{Rgb, Surface, BLACK, WHITE};
use crate::terminal::Terminal;

/// Vertical position of each panel baseline as a fraction of the height.
const FREQ_BASELINE: f32 = 0.30;
const TIME_BASELINE: f32 = 0.65;
const LEVEL_BASELINE: f32 = 0.90;

/// Gain step per keypress; the control clamps to [0, 1].
const GAIN_STEP: f32 = 0.05;
/// Frequency step per keypress in Hz; the control clamps to [200, 22000].
const FREQ_STEP: f32 = 500.0;

/// Label font requested from surfaces that support font selection.
const LABEL_FONT: &str = "300 16px monospace";

const FREQ_TITLE: &str = "Freq. domain plot";
const TIME_TITLE: &str = "Time domain plot";
const LEVEL_TITLE: &str = "Audio Levels";

/// Per-panel bar geometry derived from the surface dimensions.
#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    pub width: f32,
    pub height: f32,
    pub bar_width: f32,
    pub gap: f32,
    pub padding: f32,
    /// Vertical units per magnitude step, so a full-scale bar occupies a
    /// fixed fraction of any surface height.
    pub vscale: f32,
    /// Numeric labels enabled (wide-viewport predicate).
    pub labels: bool,
}

impl Geometry {
    pub fn compute(
        width: f32,
        height: f32,
        fft_size: usize,
        buffer_len: usize,
        gap: f32,
        padding: f32,
        labels: bool,
    ) -> Self {
        let bar_width =
            (width - fft_size as f32 * (gap / 2.0) - padding) / buffer_len as f32;
        Self {
            width,
            height,
            bar_width,
            gap,
            padding,
            vscale: height / 256.0,
            labels,
        }
    }

    fn label_offset(&self) -> f32 {
        (self.height * 0.02).max(1.0)
    }
}

/// One tick's worth of analyzer samples. Ephemeral: rebuilt every frame,
/// never persisted.
pub struct RenderFrame {
    pub freq_left: Vec<u8>,
    pub freq_right: Vec<u8>,
    pub time_left: Vec<u8>,
    pub time_right: Vec<u8>,
    pub level_left: f32,
    pub level_right: f32,
}

impl RenderFrame {
    /// Pull all four sequences. Each analyzer call refreshes a shared
    /// buffer, so the values are copied out before the next call.
    pub fn sample(handles: &mut GraphHandles) -> Self {
        let freq_left = handles.left_analyzer.sample_frequency_domain().to_vec();
        let time_left = handles.left_analyzer.sample_time_domain().to_vec();
        let freq_right = handles.right_analyzer.sample_frequency_domain().to_vec();
        let time_right = handles.right_analyzer.sample_time_domain().to_vec();
        let level_left = mean_level(&freq_left);
        let level_right = mean_level(&freq_right);
        Self {
            freq_left,
            freq_right,
            time_left,
            time_right,
            level_left,
            level_right,
        }
    }
}

/// Green for the right channel, brighter with magnitude.
fn right_color(value: u8) -> Rgb {
    Rgb {
        r: 50,
        g: (100 + value as u16).min(255) as u8,
        b: 50,
    }
}

/// Blue for the left channel, brighter with magnitude.
fn left_color(value: u8) -> Rgb {
    Rgb {
        r: 50,
        g: 50,
        b: (100 + value as u16).min(255) as u8,
    }
}

/// Draw one panel of paired bars around a baseline: right channel above,
/// left channel below, cursor advancing by `bar_width + gap`.
fn draw_bar_panel<S: Surface>(
    surface: &mut S,
    geo: &Geometry,
    baseline: f32,
    left: &[u8],
    right: &[u8],
) {
    let mut x = geo.padding / 2.0;
    for (&vl, &vr) in left.iter().zip(right) {
        let height_left = vl as f32 / 4.0 * geo.vscale;
        let height_right = vr as f32 / 4.0 * geo.vscale;

        surface.fill_rect(x, baseline, geo.bar_width, -height_right, right_color(vr));
        surface.fill_rect(x, baseline, geo.bar_width, height_left, left_color(vl));

        if geo.labels {
            let label_x = x + geo.bar_width / 2.0;
            surface.fill_text(
                &vr.to_string(),
                label_x,
                baseline - height_right - geo.label_offset(),
                WHITE,
            );
            surface.fill_text(
                &vl.to_string(),
                label_x,
                baseline + height_left + geo.label_offset(),
                WHITE,
            );
        }

        x += geo.bar_width + geo.gap;
    }
}

/// Draw the level meters: a horizontal baseline marker and one vertical bar
/// per channel scaled by half its average magnitude.
fn draw_level_meters<S: Surface>(
    surface: &mut S,
    geo: &Geometry,
    baseline: f32,
    level_left: f32,
    level_right: f32,
) {
    let cx = geo.width / 2.0;
    let marker_h = (geo.height * 0.003).max(1.0);
    surface.fill_rect(
        cx - geo.bar_width - geo.gap,
        baseline,
        2.0 * geo.bar_width + geo.gap,
        marker_h,
        WHITE,
    );

    let height_left = level_left / 2.0 * geo.vscale;
    let height_right = level_right / 2.0 * geo.vscale;
    surface.fill_rect(
        cx,
        baseline,
        geo.bar_width,
        -height_right,
        right_color(level_right as u8),
    );
    surface.fill_rect(
        cx - (geo.bar_width + geo.gap),
        baseline,
        geo.bar_width,
        -height_left,
        left_color(level_left as u8),
    );

    if geo.labels {
        surface.fill_text(
            &format!("{}", level_left.round()),
            cx - geo.bar_width,
            baseline - height_left - geo.label_offset(),
            WHITE,
        );
        surface.fill_text(
            &format!("{}", level_right.round()),
            cx,
            baseline - height_right - geo.label_offset(),
            WHITE,
        );
    }
}

fn draw_title<S: Surface>(surface: &mut S, geo: &Geometry, title: &str, baseline: f32) {
    let x = geo.width / 2.0 - title.len() as f32 / 2.0;
    let y = baseline - 64.0 * geo.vscale - geo.label_offset();
    surface.fill_text(title, x, y, WHITE);
}

/// Draw the full frame: clear to black, then the frequency, time, and level
/// panels. Titles draw every frame; labels only on wide viewports.
pub fn draw_frame<S: Surface>(surface: &mut S, frame: &RenderFrame, geo: &Geometry) {
    surface.clear(BLACK);

    let freq_baseline = geo.height * FREQ_BASELINE;
    let time_baseline = geo.height * TIME_BASELINE;
    let level_baseline = geo.height * LEVEL_BASELINE;

    draw_title(surface, geo, FREQ_TITLE, freq_baseline);
    draw_bar_panel(surface, geo, freq_baseline, &frame.freq_left, &frame.freq_right);

    draw_title(surface, geo, TIME_TITLE, time_baseline);
    draw_bar_panel(surface, geo, time_baseline, &frame.time_left, &frame.time_right);

    draw_title(surface, geo, LEVEL_TITLE, level_baseline);
    draw_level_meters(surface, geo, level_baseline, frame.level_left, frame.level_right);
}

/// Cooperative cancellation shared between the loop and its owner.
#[derive(Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// Terminal: a stopped loop is never restarted.
    Stopped,
}

/// The self-rescheduling draw task.
pub struct RenderLoop {
    state: LoopState,
    cancel: CancelFlag,
    frames_drawn: u64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            cancel: CancelFlag::new(),
            frames_drawn: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// `Idle → Running`, fired once the graph is ready.
    pub fn start(&mut self) {
        if self.state == LoopState::Idle {
            self.state = LoopState::Running;
        }
    }

    /// Draw one frame. Returns false when the loop should not reschedule:
    /// either it is not running or the cancellation flag was raised. The
    /// flag is checked after drawing, so cancellation is cooperative and the
    /// in-flight frame always completes.
    pub fn frame<S: Surface>(
        &mut self,
        surface: &mut S,
        handles: &mut GraphHandles,
        config: &VizConfig,
    ) -> bool {
        if self.state != LoopState::Running {
            return false;
        }

        let geo = Geometry::compute(
            surface.width(),
            surface.height(),
            config.fft_size,
            config.buffer_len(),
            config.gap,
            config.padding,
            surface.is_wide_viewport(config.wide_threshold),
        );
        let frame = RenderFrame::sample(handles);
        draw_frame(surface, &frame, &geo);
        self.frames_drawn += 1;

        !self.cancel.is_cancelled()
    }

    /// `Running → Stopped` at session teardown.
    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
    }
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

enum ControlAction {
    None,
    Quit,
}

/// Keyboard stand-ins for the gain and frequency sliders. Clamping happens
/// here, at the control, not in the parameter bridge.
struct Controls {
    paused: bool,
    show_help: bool,
}

const HELP: &str = "\
CONTROLS
─────────────
[ ]  Left gain -/+
{ }  Right gain -/+
, .  Left osc freq -/+
< >  Right osc freq -/+
spc  Pause drawing
h    Toggle help
q    Quit";

impl Controls {
    fn new() -> Self {
        Self {
            paused: false,
            show_help: false,
        }
    }

    fn handle_key<H: AudioHost>(
        &mut self,
        session: &mut Session<H>,
        code: KeyCode,
        _modifiers: KeyModifiers,
    ) -> ControlAction {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return ControlAction::Quit,
            KeyCode::Char(' ') => self.paused = !self.paused,
            KeyCode::Char('h') => self.show_help = !self.show_help,
            KeyCode::Char('[') => adjust_gain(session, LEFT_GAIN, -GAIN_STEP),
            KeyCode::Char(']') => adjust_gain(session, LEFT_GAIN, GAIN_STEP),
            KeyCode::Char('{') => adjust_gain(session, RIGHT_GAIN, -GAIN_STEP),
            KeyCode::Char('}') => adjust_gain(session, RIGHT_GAIN, GAIN_STEP),
            KeyCode::Char(',') => adjust_frequency(session, LEFT_OSCILLATOR, -FREQ_STEP),
            KeyCode::Char('.') => adjust_frequency(session, LEFT_OSCILLATOR, FREQ_STEP),
            KeyCode::Char('<') => adjust_frequency(session, RIGHT_OSCILLATOR, -FREQ_STEP),
            KeyCode::Char('>') => adjust_frequency(session, RIGHT_OSCILLATOR, FREQ_STEP),
            _ => {}
        }
        ControlAction::None
    }
}

fn adjust_gain<H: AudioHost>(session: &mut Session<H>, name: &str, delta: f32) {
    let Some(current) = session.gain_state().get(name).map(|s| s.value) else {
        return;
    };
    session.handle_gain_change(name, (current + delta).clamp(0.0, 1.0));
}

fn adjust_frequency<H: AudioHost>(session: &mut Session<H>, name: &str, delta: f32) {
    let Some(current) = session
        .oscillator_state()
        .get(name)
        .map(|s| s.frequency_hz)
    else {
        return;
    };
    session.handle_frequency_change(
        name,
        (current + delta).clamp(OSC_FREQ_MIN_HZ, OSC_FREQ_MAX_HZ),
    );
}

/// Status line reflecting the mirrored parameter state.
fn status_line<H: AudioHost>(session: &Session<H>) -> String {
    let gain = |name: &str| {
        session
            .gain_state()
            .get(name)
            .map(|s| s.value)
            .unwrap_or(0.0)
    };
    let mut line = format!("L gain {:.2}  R gain {:.2}", gain(LEFT_GAIN), gain(RIGHT_GAIN));
    if let Some(osc) = session.oscillator_state().get(LEFT_OSCILLATOR) {
        line.push_str(&format!("  |  L osc {:.0} Hz", osc.frequency_hz));
    }
    if let Some(osc) = session.oscillator_state().get(RIGHT_OSCILLATOR) {
        line.push_str(&format!("  R osc {:.0} Hz", osc.frequency_hz));
    }
    line.push_str("  |  h help");
    line
}

/// Interactive render loop over the terminal surface. Runs until the user
/// quits or the graph disappears, then transitions the loop to `Stopped`.
pub fn run<H: AudioHost>(
    term: &mut Terminal,
    session: &mut Session<H>,
    config: &VizConfig,
    log: &mut DebugLogger,
) -> io::Result<()> {
    let mut render_loop = RenderLoop::new();
    let cancel = render_loop.cancel_flag();
    let mut controls = Controls::new();

    // The surface must match the viewport before the first draw.
    term.sync_size()?;
    term.clear_screen()?;
    Surface::set_font(term, LABEL_FONT);
    render_loop.start();

    loop {
        if term.sync_size()? {
            dbg_log!(log, "resize to {:?}", term.size());
        }

        if let Some((code, mods)) = term.check_key()? {
            if let ControlAction::Quit = controls.handle_key(session, code, mods) {
                cancel.cancel();
            }
        }

        if controls.paused && !cancel.is_cancelled() {
            term.sleep(config.frame_time);
            continue;
        }

        let more = match session.handles_mut() {
            Some(handles) => render_loop.frame(term, handles, config),
            None => false,
        };

        let status = status_line(session);
        let height = term.size().1 as i32;
        term.set_str(0, height - 1, &status, None);
        if controls.show_help {
            for (i, line) in HELP.lines().enumerate() {
                term.set_str(1, 1 + i as i32, line, None);
            }
        }

        term.present()?;
        if !more {
            break;
        }
        term.sleep(config.frame_time);
    }

    render_loop.stop();
    dbg_log!(log, "render loop stopped after {} frames", render_loop.frames_drawn());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_oscillator_graph;

    #[derive(Debug, PartialEq)]
    enum Op {
        Clear,
        Rect { x: f32, y: f32, w: f32, h: f32 },
        Text { s: String, x: f32, y: f32 },
    }

    struct RecordingSurface {
        width: f32,
        height: f32,
        wide: bool,
        ops: Vec<Op>,
    }

    impl RecordingSurface {
        fn new(width: f32, height: f32, wide: bool) -> Self {
            Self {
                width,
                height,
                wide,
                ops: Vec::new(),
            }
        }

        fn rects(&self) -> Vec<&Op> {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Rect { .. }))
                .collect()
        }

        fn texts(&self) -> Vec<&Op> {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Text { .. }))
                .collect()
        }
    }

    impl Surface for RecordingSurface {
        fn width(&self) -> f32 {
            self.width
        }

        fn height(&self) -> f32 {
            self.height
        }

        fn clear(&mut self, _color: Rgb) {
            self.ops.push(Op::Clear);
        }

        fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, _color: Rgb) {
            self.ops.push(Op::Rect { x, y, w, h });
        }

        fn fill_text(&mut self, text: &str, x: f32, y: f32, _color: Rgb) {
            self.ops.push(Op::Text {
                s: text.into(),
                x,
                y,
            });
        }

        fn is_wide_viewport(&self, _threshold_px: f32) -> bool {
            self.wide
        }
    }

    fn test_frame(buffer_len: usize) -> RenderFrame {
        RenderFrame {
            freq_left: vec![0; buffer_len],
            freq_right: vec![0; buffer_len],
            time_left: vec![128; buffer_len],
            time_right: vec![128; buffer_len],
            level_left: 0.0,
            level_right: 0.0,
        }
    }

    #[test]
    fn geometry_for_full_hd_defaults() {
        let geo = Geometry::compute(1920.0, 1080.0, 32, 16, 3.0, 20.0, true);
        assert!((geo.bar_width - 118.25).abs() < 1e-4);
    }

    #[test]
    fn panels_draw_regardless_of_viewport_width() {
        let geo = Geometry::compute(640.0, 480.0, 32, 16, 3.0, 20.0, false);
        let mut surface = RecordingSurface::new(640.0, 480.0, false);
        draw_frame(&mut surface, &test_frame(16), &geo);

        // 16 bar pairs in each of two panels, plus marker and two meters.
        assert_eq!(surface.rects().len(), 4 * 16 + 3);
        // Titles only: no numeric labels on a narrow viewport.
        assert_eq!(surface.texts().len(), 3);
        assert_eq!(surface.ops[0], Op::Clear);
    }

    #[test]
    fn wide_viewport_adds_numeric_labels() {
        let geo = Geometry::compute(1920.0, 1080.0, 32, 16, 3.0, 20.0, true);
        let mut surface = RecordingSurface::new(1920.0, 1080.0, true);
        draw_frame(&mut surface, &test_frame(16), &geo);

        // 3 titles + two labels per bar pair per panel + two meter labels.
        assert_eq!(surface.texts().len(), 3 + 4 * 16 + 2);
    }

    #[test]
    fn bar_cursor_advances_by_bar_width_plus_gap() {
        let geo = Geometry::compute(1920.0, 1080.0, 32, 16, 3.0, 20.0, false);
        let mut surface = RecordingSurface::new(1920.0, 1080.0, false);
        draw_frame(&mut surface, &test_frame(16), &geo);

        let rects = surface.rects();
        let (x0, x1) = match (rects[0], rects[2]) {
            (Op::Rect { x: x0, .. }, Op::Rect { x: x1, .. }) => (*x0, *x1),
            _ => unreachable!(),
        };
        assert!((x0 - 10.0).abs() < 1e-4, "cursor starts at padding/2");
        assert!((x1 - x0 - (118.25 + 3.0)).abs() < 1e-4);
    }

    #[test]
    fn level_meter_bar_scales_by_half_the_average() {
        let geo = Geometry::compute(1920.0, 1080.0, 32, 16, 3.0, 20.0, false);
        let mut surface = RecordingSurface::new(1920.0, 1080.0, false);
        let mut frame = test_frame(16);
        frame.level_right = 255.0;
        draw_frame(&mut surface, &frame, &geo);

        let cx = 960.0;
        let meter = surface
            .ops
            .iter()
            .find_map(|op| match op {
                Op::Rect { x, h, .. } if (*x - cx).abs() < 1e-4 && *h < 0.0 => Some(*h),
                _ => None,
            })
            .expect("right meter bar drawn");
        assert!((meter + 255.0 / 2.0 * geo.vscale).abs() < 1e-3);
    }

    #[test]
    fn loop_runs_and_draws_before_any_state_change() {
        let (_, mut handles) = build_oscillator_graph(19_000.0, 19_000.0, 48_000, 32);
        let config = VizConfig::default();
        let mut surface = RecordingSurface::new(1920.0, 1080.0, true);

        let mut render_loop = RenderLoop::new();
        assert_eq!(render_loop.state(), LoopState::Idle);

        render_loop.start();
        assert_eq!(render_loop.state(), LoopState::Running);

        assert!(render_loop.frame(&mut surface, &mut handles, &config));
        assert!(render_loop.frames_drawn() >= 1);
        assert!(!surface.rects().is_empty());
        assert_eq!(render_loop.state(), LoopState::Running);
    }

    #[test]
    fn cancellation_is_checked_before_reschedule() {
        let (_, mut handles) = build_oscillator_graph(19_000.0, 19_000.0, 48_000, 32);
        let config = VizConfig::default();
        let mut surface = RecordingSurface::new(640.0, 480.0, false);

        let mut render_loop = RenderLoop::new();
        render_loop.start();
        render_loop.cancel_flag().cancel();

        // The in-flight frame completes, then the loop declines to continue.
        assert!(!render_loop.frame(&mut surface, &mut handles, &config));
        assert_eq!(render_loop.frames_drawn(), 1);

        render_loop.stop();
        assert_eq!(render_loop.state(), LoopState::Stopped);
    }

    #[test]
    fn idle_and_stopped_loops_do_not_draw() {
        let (_, mut handles) = build_oscillator_graph(19_000.0, 19_000.0, 48_000, 32);
        let config = VizConfig::default();
        let mut surface = RecordingSurface::new(640.0, 480.0, false);

        let mut render_loop = RenderLoop::new();
        assert!(!render_loop.frame(&mut surface, &mut handles, &config));
        render_loop.start();
        render_loop.stop();
        assert!(!render_loop.frame(&mut surface, &mut handles, &config));
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn sampled_sequences_have_buffer_len_elements() {
        let (_, mut handles) = build_oscillator_graph(19_000.0, 19_000.0, 48_000, 32);
        let frame = RenderFrame::sample(&mut handles);
        assert_eq!(frame.freq_left.len(), 16);
        assert_eq!(frame.freq_right.len(), 16);
        assert_eq!(frame.time_left.len(), 16);
        assert_eq!(frame.time_right.len(), 16);
    }
}
