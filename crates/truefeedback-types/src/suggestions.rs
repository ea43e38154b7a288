//! Message prompt suggestions: always exactly three prompts joined by `||`.

pub const SEPARATOR: &str = "||";

pub const PROMPT_COUNT: usize = 3;

/// Built-in prompt sets served when no text-generation provider is configured.
pub const PRESETS: [[&str; PROMPT_COUNT]; 4] = [
    [
        "What's a hobby you picked up recently?",
        "Which historical figure would you invite to dinner?",
        "What small thing reliably makes your day better?",
    ],
    [
        "What's the best piece of advice you've been given?",
        "If you could master one skill overnight, which would it be?",
        "How do you like to spend a free weekend?",
    ],
    [
        "Which book changed the way you see things?",
        "What era would you most like to visit?",
        "What are you grateful for today?",
    ],
    [
        "Where would you travel if money were no object?",
        "Which superpower would you pick and why?",
        "What's the most surprising fact you know?",
    ],
];

/// Split provider output into prompts. Returns `None` unless there are exactly
/// three non-empty prompts.
pub fn parse(raw: &str) -> Option<Vec<String>> {
    let prompts: Vec<String> = raw
        .trim()
        .split(SEPARATOR)
        .map(|p| p.trim().trim_matches('"').trim().to_string())
        .collect();

    if prompts.len() != PROMPT_COUNT || prompts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(prompts)
}

pub fn join<S: AsRef<str>>(prompts: &[S]) -> String {
    prompts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}
