//! Sprite animation
//!
//! An `AnimationClip` cycles through texture handles at a fixed rate. The
//! player owns one `AnimationSet` holding every clip; exactly one of them
//! is active at a time.

use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::physics::Direction;
use crate::renderer::{load_texture_or_default, AssetLoader, TextureHandle};

/// A looping (or one-shot) sequence of frames
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    name: String,
    frames: Vec<TextureHandle>,
    frame_duration: f32,
    pointer: usize,
    playing: bool,
    looping: bool,
    elapsed: f32,
}

impl AnimationClip {
    /// A clip needs at least one frame. Non-positive rates play at 1 fps.
    pub fn new(name: &str, frames: Vec<TextureHandle>, fps: f32) -> EngineResult<Self> {
        if frames.is_empty() {
            return Err(EngineError::InvalidAnimation {
                name: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            frames,
            frame_duration: frame_duration(fps),
            pointer: 0,
            playing: false,
            looping: true,
            elapsed: 0.0,
        })
    }

    /// Load `frame_count` frames named `<stem>_<i>.png`, falling back to
    /// `<stem>.png` and then the default texture for each missing frame
    pub fn load<L: AssetLoader + ?Sized>(loader: &mut L, spec: &ClipSpec) -> Self {
        let count = spec.frame_count.max(1);
        let frames = (0..count)
            .map(|i| {
                let candidates = [
                    PathBuf::from(format!("{}_{}.png", spec.file_stem, i)),
                    PathBuf::from(format!("{}.png", spec.file_stem)),
                ];
                load_texture_or_default(loader, &candidates)
            })
            .collect();

        Self {
            name: spec.file_stem.to_string(),
            frames,
            frame_duration: frame_duration(spec.fps),
            pointer: 0,
            playing: false,
            looping: true,
            elapsed: 0.0,
        }
    }

    /// Start or unpause; the frame timer starts over
    pub fn play(&mut self) {
        self.playing = true;
        self.elapsed = 0.0;
    }

    /// Halt and rewind to the first frame
    pub fn stop(&mut self) {
        self.playing = false;
        self.pointer = 0;
        self.elapsed = 0.0;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Unpause without touching the timer
    pub fn resume(&mut self) {
        self.playing = true;
    }

    /// Advance by `dt` seconds. One frame step at most per call.
    pub fn update(&mut self, dt: f32) {
        if !self.playing {
            return;
        }

        self.elapsed += dt.max(0.0);
        if self.elapsed < self.frame_duration {
            return;
        }
        self.elapsed = 0.0;

        if self.pointer + 1 < self.frames.len() {
            self.pointer += 1;
        } else if self.looping {
            self.pointer = 0;
        } else {
            // One-shot clips hold their last frame
            self.playing = false;
        }
    }

    pub fn current_frame(&self) -> TextureHandle {
        self.frames[self.pointer]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn frame_duration(&self) -> f32 {
        self.frame_duration
    }
}

fn frame_duration(fps: f32) -> f32 {
    if fps > 0.0 {
        1.0 / fps
    } else {
        1.0
    }
}

/// Player animation states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnimationState {
    #[default]
    Idle,
    WalkLeft,
    WalkRight,
    JumpNeutral,
    JumpLeft,
    JumpRight,
}

impl AnimationState {
    pub const ALL: [AnimationState; 6] = [
        AnimationState::Idle,
        AnimationState::WalkLeft,
        AnimationState::WalkRight,
        AnimationState::JumpNeutral,
        AnimationState::JumpLeft,
        AnimationState::JumpRight,
    ];

    /// Transition table, first match wins
    pub fn select(grounded: bool, direction: Direction) -> Self {
        match (grounded, direction) {
            (true, Direction::None) => AnimationState::Idle,
            (false, Direction::Right) => AnimationState::JumpRight,
            (false, Direction::Left) => AnimationState::JumpLeft,
            (false, Direction::None) => AnimationState::JumpNeutral,
            (true, Direction::Right) => AnimationState::WalkRight,
            (true, Direction::Left) => AnimationState::WalkLeft,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Where a state's frames come from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSpec {
    pub state: AnimationState,
    pub file_stem: &'static str,
    pub frame_count: usize,
    pub fps: f32,
}

/// Player sprite sheets, in `AnimationState::ALL` order
pub const PLAYER_CLIPS: [ClipSpec; 6] = [
    ClipSpec { state: AnimationState::Idle, file_stem: "player1", frame_count: 4, fps: 8.0 },
    ClipSpec { state: AnimationState::WalkLeft, file_stem: "player_walk_left", frame_count: 3, fps: 10.0 },
    ClipSpec { state: AnimationState::WalkRight, file_stem: "player_walk_right", frame_count: 6, fps: 12.0 },
    ClipSpec { state: AnimationState::JumpNeutral, file_stem: "player_jump", frame_count: 3, fps: 10.0 },
    ClipSpec { state: AnimationState::JumpLeft, file_stem: "player_jump_left", frame_count: 4, fps: 16.0 },
    ClipSpec { state: AnimationState::JumpRight, file_stem: "player_jump_right", frame_count: 4, fps: 16.0 },
];

/// One clip per `AnimationState`, one of them active
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSet {
    clips: Vec<AnimationClip>,
    current: AnimationState,
}

impl AnimationSet {
    /// `clips` must be given in `AnimationState::ALL` order
    pub fn new(clips: Vec<AnimationClip>) -> EngineResult<Self> {
        if clips.len() != AnimationState::ALL.len() {
            return Err(EngineError::InvalidAnimation {
                name: format!("set of {} clips", clips.len()),
            });
        }

        let mut set = Self {
            clips,
            current: AnimationState::Idle,
        };
        set.clips[AnimationState::Idle.index()].play();
        Ok(set)
    }

    /// Every state shows the same single texture
    pub fn uniform(texture: TextureHandle) -> Self {
        let clips = PLAYER_CLIPS
            .iter()
            .map(|spec| AnimationClip {
                name: spec.file_stem.to_string(),
                frames: vec![texture; spec.frame_count.max(1)],
                frame_duration: frame_duration(spec.fps),
                pointer: 0,
                playing: false,
                looping: true,
                elapsed: 0.0,
            })
            .collect();

        let mut set = Self {
            clips,
            current: AnimationState::Idle,
        };
        set.clips[AnimationState::Idle.index()].play();
        set
    }

    pub fn load<L: AssetLoader + ?Sized>(loader: &mut L) -> Self {
        let clips = PLAYER_CLIPS
            .iter()
            .map(|spec| AnimationClip::load(loader, spec))
            .collect();

        log::info!("[AnimationSet::load] Loaded {} player clips", PLAYER_CLIPS.len());
        let mut set = Self {
            clips,
            current: AnimationState::Idle,
        };
        set.clips[AnimationState::Idle.index()].play();
        set
    }

    /// Switch clips. Returns false when `next` is already active.
    pub fn transition(&mut self, next: AnimationState) -> bool {
        if next == self.current {
            return false;
        }

        self.clips[self.current.index()].stop();
        self.current = next;
        self.clips[next.index()].play();
        true
    }

    pub fn update(&mut self, dt: f32) {
        self.clips[self.current.index()].update(dt);
    }

    pub fn current_state(&self) -> AnimationState {
        self.current
    }

    pub fn current_clip(&self) -> &AnimationClip {
        &self.clips[self.current.index()]
    }

    pub fn clip(&self, state: AnimationState) -> &AnimationClip {
        &self.clips[state.index()]
    }

    pub fn current_frame(&self) -> TextureHandle {
        self.current_clip().current_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(frames: u32, fps: f32) -> AnimationClip {
        AnimationClip::new("test", (0..frames).map(TextureHandle).collect(), fps).unwrap()
    }

    #[test]
    fn test_empty_clip_is_rejected() {
        assert!(matches!(
            AnimationClip::new("empty", Vec::new(), 10.0),
            Err(EngineError::InvalidAnimation { .. })
        ));
    }

    #[test]
    fn test_pointer_stays_in_bounds_for_any_update_sequence() {
        let mut anim = clip(3, 10.0);
        anim.play();
        let deltas = [0.0, 0.01, 0.5, 0.1, 0.099, 2.0, 0.3, 0.0, 0.1, 0.1, 0.1];
        for (i, dt) in deltas.iter().cycle().take(500).enumerate() {
            if i % 37 == 0 {
                anim.pause();
            }
            if i % 41 == 0 {
                anim.resume();
            }
            anim.update(*dt);
            assert!(anim.pointer() < anim.frame_count());
        }
    }

    #[test]
    fn test_pointer_only_advances_when_playing() {
        let mut anim = clip(4, 10.0);
        anim.update(1.0);
        assert_eq!(anim.pointer(), 0);

        anim.play();
        anim.update(0.05);
        assert_eq!(anim.pointer(), 0);
        anim.update(0.05);
        assert_eq!(anim.pointer(), 1);

        anim.pause();
        anim.update(1.0);
        assert_eq!(anim.pointer(), 1);
    }

    #[test]
    fn test_looping_wraps_and_one_shot_holds_last_frame() {
        let mut looping = clip(2, 10.0);
        looping.play();
        looping.update(0.1);
        looping.update(0.1);
        assert_eq!(looping.pointer(), 0);

        let mut once = clip(2, 10.0);
        once.set_looping(false);
        once.play();
        for _ in 0..5 {
            once.update(0.1);
        }
        assert_eq!(once.pointer(), 1);
        assert!(!once.is_playing());
    }

    #[test]
    fn test_stop_rewinds() {
        let mut anim = clip(3, 10.0);
        anim.play();
        anim.update(0.1);
        anim.stop();
        assert_eq!(anim.pointer(), 0);
        assert!(!anim.is_playing());
    }

    #[test]
    fn test_transition_table() {
        use AnimationState::*;
        assert_eq!(AnimationState::select(true, Direction::None), Idle);
        assert_eq!(AnimationState::select(true, Direction::Left), WalkLeft);
        assert_eq!(AnimationState::select(true, Direction::Right), WalkRight);
        assert_eq!(AnimationState::select(false, Direction::None), JumpNeutral);
        assert_eq!(AnimationState::select(false, Direction::Left), JumpLeft);
        assert_eq!(AnimationState::select(false, Direction::Right), JumpRight);
    }

    #[test]
    fn test_transition_stops_old_and_plays_new() {
        let mut set = AnimationSet::uniform(TextureHandle(7));
        assert!(set.clip(AnimationState::Idle).is_playing());

        assert!(set.transition(AnimationState::WalkRight));
        assert!(!set.clip(AnimationState::Idle).is_playing());
        assert!(set.current_clip().is_playing());
        assert_eq!(set.current_clip().frame_count(), 6);

        assert!(!set.transition(AnimationState::WalkRight));
        assert_eq!(set.current_frame(), TextureHandle(7));
    }

    #[test]
    fn test_set_requires_one_clip_per_state() {
        assert!(AnimationSet::new(vec![clip(1, 1.0)]).is_err());
        let clips = (0..6).map(|_| clip(2, 5.0)).collect();
        let set = AnimationSet::new(clips).unwrap();
        assert_eq!(set.current_state(), AnimationState::Idle);
    }
}
