//! Text and quiz prompts shown over the map.
//!
//! Prompts reveal a character at a time. Confirm first completes the reveal
//! and only a second confirm dismisses a message or submits an answer.

use engine::{PanelAnchor, TextPanel};

pub const DEFAULT_SECONDS_PER_CHAR: f32 = 0.03;
const MAX_ANSWER_CHARS: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Message,
    Question,
}

#[derive(Debug, Clone)]
struct ActivePrompt {
    id: PromptId,
    kind: PromptKind,
    text: String,
    link: Option<String>,
    revealed_chars: usize,
    reveal_clock: f32,
    answer: String,
}

impl ActivePrompt {
    fn total_chars(&self) -> usize {
        self.text.chars().count()
    }

    fn is_revealed(&self) -> bool {
        self.revealed_chars >= self.total_chars()
    }
}

#[derive(Debug, Clone)]
pub struct DialogueOverlay {
    seconds_per_char: f32,
    next_id: u64,
    active: Option<ActivePrompt>,
    dismissed: Vec<PromptId>,
    answers: Vec<(PromptId, String)>,
}

impl Default for DialogueOverlay {
    fn default() -> Self {
        Self::new(DEFAULT_SECONDS_PER_CHAR)
    }
}

impl DialogueOverlay {
    pub fn new(seconds_per_char: f32) -> Self {
        Self {
            seconds_per_char: seconds_per_char.max(0.0),
            next_id: 0,
            active: None,
            dismissed: Vec::new(),
            answers: Vec::new(),
        }
    }

    pub fn show_text(&mut self, text: impl Into<String>, link: Option<String>) -> PromptId {
        self.open(PromptKind::Message, text.into(), link)
    }

    pub fn ask(&mut self, question: impl Into<String>) -> PromptId {
        self.open(PromptKind::Question, question.into(), None)
    }

    fn open(&mut self, kind: PromptKind, text: String, link: Option<String>) -> PromptId {
        let id = PromptId(self.next_id);
        self.next_id += 1;
        let revealed_chars = if self.seconds_per_char == 0.0 {
            text.chars().count()
        } else {
            0
        };
        self.active = Some(ActivePrompt {
            id,
            kind,
            text,
            link,
            revealed_chars,
            reveal_clock: 0.0,
            answer: String::new(),
        });
        id
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_revealing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|prompt| !prompt.is_revealed())
    }

    pub fn tick(&mut self, fixed_dt_seconds: f32) {
        let Some(prompt) = self.active.as_mut() else {
            return;
        };
        if prompt.is_revealed() {
            return;
        }
        prompt.reveal_clock += fixed_dt_seconds;
        while prompt.reveal_clock >= self.seconds_per_char && !prompt.is_revealed() {
            prompt.reveal_clock -= self.seconds_per_char;
            prompt.revealed_chars += 1;
        }
    }

    pub fn confirm(&mut self) {
        let Some(prompt) = self.active.as_mut() else {
            return;
        };
        if !prompt.is_revealed() {
            prompt.revealed_chars = prompt.total_chars();
            return;
        }
        if let Some(prompt) = self.active.take() {
            match prompt.kind {
                PromptKind::Message => self.dismissed.push(prompt.id),
                PromptKind::Question => self.answers.push((prompt.id, prompt.answer)),
            }
        }
    }

    pub fn type_text(&mut self, text: &str) {
        if let Some(prompt) = self.active.as_mut() {
            if prompt.kind == PromptKind::Question {
                let room = MAX_ANSWER_CHARS.saturating_sub(prompt.answer.chars().count());
                prompt.answer.extend(text.chars().take(room));
            }
        }
    }

    pub fn backspace(&mut self) {
        if let Some(prompt) = self.active.as_mut() {
            if prompt.kind == PromptKind::Question {
                prompt.answer.pop();
            }
        }
    }

    pub fn take_dismissed(&mut self, id: PromptId) -> bool {
        match self.dismissed.iter().position(|done| *done == id) {
            Some(index) => {
                self.dismissed.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn take_answer(&mut self, id: PromptId) -> Option<String> {
        let index = self.answers.iter().position(|(done, _)| *done == id)?;
        Some(self.answers.swap_remove(index).1)
    }

    /// Drops whatever is on screen, e.g. when its cutscene was aborted.
    pub fn clear(&mut self) {
        self.active = None;
        self.dismissed.clear();
        self.answers.clear();
    }

    pub fn panel(&self) -> Option<TextPanel> {
        let prompt = self.active.as_ref()?;
        let revealed: String = prompt.text.chars().take(prompt.revealed_chars).collect();
        let mut lines = vec![revealed];
        if prompt.is_revealed() {
            if let Some(link) = &prompt.link {
                lines.push(format!("Download: {link}"));
            }
        }
        if prompt.kind == PromptKind::Question {
            lines.push(format!("> {}_", prompt.answer));
        }
        Some(TextPanel::new(PanelAnchor::Bottom, lines))
    }
}
