// [[RARO]]/apps/telemetry-server/src/tasks/describe.rs
// Purpose: Heuristic names for background tasks, from their raw output.
// Architecture: Task Engine
// Dependencies: regex

use regex::Regex;
use std::sync::OnceLock;

use crate::events::truncate_chars;

/// Output as the rules see it: raw for extraction, lower-cased for matching.
pub struct Haystack<'a> {
    raw: &'a str,
    lower: String,
}

impl<'a> Haystack<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            lower: raw.to_lowercase(),
        }
    }

    fn has(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    fn has_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.lower.contains(n))
    }
}

pub enum Label {
    Static(&'static str),
    Computed(fn(&Haystack) -> String),
}

pub struct Rule {
    pub matches: fn(&Haystack) -> bool,
    pub label: Label,
}

const fn rule(matches: fn(&Haystack) -> bool, label: &'static str) -> Rule {
    Rule {
        matches,
        label: Label::Static(label),
    }
}

fn is_server(h: &Haystack) -> bool {
    h.has_any(&["server running", "listening on", "server on"])
}

fn runs_script(h: &Haystack) -> bool {
    h.has_any(&["npm run", "bun run", "pnpm run"])
}

fn is_git(h: &Haystack) -> bool {
    h.has("git ")
}

fn is_browser(h: &Haystack) -> bool {
    h.has_any(&["browse.ts", "playwright", "puppeteer"])
}

fn is_watcher(h: &Haystack) -> bool {
    h.has_any(&["watching:", "file watcher", "watch mode"])
}

fn is_docker(h: &Haystack) -> bool {
    h.has("docker")
}

fn port_regex() -> &'static Regex {
    static PORT: OnceLock<Regex> = OnceLock::new();
    PORT.get_or_init(|| Regex::new(r"(?i)(?:port|localhost:|:)(\d{4,5})").expect("valid port regex"))
}

fn server_label(h: &Haystack) -> String {
    let Some(port) = port_regex().captures(h.raw).and_then(|c| c.get(1)) else {
        return "Running Server".to_string();
    };
    let port = port.as_str();
    if h.has_any(&["observability", "event"]) {
        format!("Observability Server :{}", port)
    } else if h.has_any(&["vite", "hmr"]) {
        format!("Vite Dev Server :{}", port)
    } else {
        format!("Server :{}", port)
    }
}

/// Ordered, first match wins. Specific rules precede the general rule of
/// their family, which is why families appear as several rows.
pub static RULES: &[Rule] = &[
    Rule {
        matches: is_server,
        label: Label::Computed(server_label),
    },
    rule(|h| runs_script(h) && h.has("test"), "Running Tests"),
    rule(|h| runs_script(h) && h.has("build"), "Building Project"),
    rule(|h| runs_script(h) && h.has("dev"), "Dev Server"),
    rule(|h| runs_script(h) && h.has("lint"), "Linting Code"),
    rule(|h| runs_script(h) && h.has("typecheck"), "Type Checking"),
    rule(|h| is_git(h) && h.has("push"), "Git Push"),
    rule(|h| is_git(h) && h.has("pull"), "Git Pull"),
    rule(|h| is_git(h) && h.has("commit"), "Git Commit"),
    rule(|h| is_git(h) && h.has("clone"), "Git Clone"),
    rule(|h| is_git(h) && h.has("fetch"), "Git Fetch"),
    rule(|h| is_git(h) && h.has("merge"), "Git Merge"),
    rule(|h| is_git(h) && h.has("rebase"), "Git Rebase"),
    rule(|h| is_browser(h) && h.has("screenshot"), "Taking Screenshot"),
    rule(|h| is_browser(h) && h.has("click"), "Browser Click Action"),
    rule(is_browser, "Browser Automation"),
    rule(|h| h.has("screenshot"), "Taking Screenshot"),
    rule(|h| is_watcher(h) && h.has(".jsonl"), "Watching JSONL Files"),
    rule(|h| is_watcher(h) && h.has(".ts"), "Watching TypeScript"),
    rule(is_watcher, "File Watcher"),
    rule(
        |h| (h.has("received") && h.has("event") || h.has("websocket")) && h.has("observability"),
        "Observability Server",
    ),
    rule(|h| h.has("received") && h.has("event") || h.has("websocket"), "Event Processing"),
    rule(|h| is_docker(h) && h.has("build"), "Docker Build"),
    rule(|h| is_docker(h) && h.has("run"), "Docker Run"),
    rule(|h| is_docker(h) && h.has("compose"), "Docker Compose"),
    rule(is_docker, "Docker Command"),
    rule(|h| h.has_any(&["installing", "npm install", "bun install"]), "Installing Dependencies"),
    rule(|h| h.has_any(&["deploy", "cloudflare", "vercel"]), "Deploying"),
    rule(|h| h.has_any(&["curl ", "http request", "api call"]), "API Request"),
    rule(|h| h.has_any(&["database", "postgresql", "mysql", "sqlite"]), "Database Operation"),
    rule(|h| h.has_any(&["searching", "grep", "find "]), "Searching Files"),
    rule(|h| h.has_any(&["claude", "anthropic", "ai agent"]), "AI Agent Task"),
];

const FALLBACK_SCAN_LINES: usize = 10;
const FALLBACK_CHARS: usize = 50;

fn log_prefix_regex() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"^(?:\d{4}-\d{2}-\d{2}|\[\w+\])").expect("valid log prefix regex"))
}

/// Describe a task from its output.
pub fn describe(content: &str, task_id: &str) -> String {
    let haystack = Haystack::new(content);
    for rule in RULES {
        if (rule.matches)(&haystack) {
            return match &rule.label {
                Label::Static(label) => label.to_string(),
                Label::Computed(f) => f(&haystack),
            };
        }
    }

    first_meaningful_line(content)
        .unwrap_or_else(|| format!("Background Task {}", truncate_chars(task_id, 7)))
}

fn first_meaningful_line(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(FALLBACK_SCAN_LINES)
        .find_map(clean_line)
}

fn clean_line(line: &str) -> Option<String> {
    let len = line.chars().count();
    if !(5..=80).contains(&len) {
        return None;
    }
    if ["[", "#", "//", "$"].iter().any(|p| line.starts_with(p)) || log_prefix_regex().is_match(line) {
        return None;
    }

    let cleaned: String = line
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().count() < 5 {
        return None;
    }

    let mut chars = cleaned.chars();
    let first = chars.next()?;
    let rest: String = chars.take(FALLBACK_CHARS - 1).collect();
    Some(first.to_uppercase().chain(rest.chars()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_rules_extract_port() {
        assert_eq!(describe("Server running at http://localhost:5173 (vite)", "t"), "Vite Dev Server :5173");
        assert_eq!(describe("Observability listening on :4000", "t"), "Observability Server :4000");
        assert_eq!(describe("server on 127.0.0.1:8080", "t"), "Server :8080");
        assert_eq!(describe("Server running", "t"), "Running Server");
    }

    #[test]
    fn earlier_rules_win() {
        assert_eq!(describe("$ npm run test\n3 passed", "t"), "Running Tests");
        assert_eq!(describe("> git push origin main", "t"), "Git Push");
        assert_eq!(describe("playwright: took screenshot", "t"), "Taking Screenshot");
        assert_eq!(describe("docker compose up", "t"), "Docker Compose");
        assert_eq!(describe("Received event over websocket for observability", "t"), "Observability Server");
    }

    #[test]
    fn unmatched_script_falls_through_to_later_rules() {
        assert_eq!(describe("npm run format\ninstalling prettier", "t"), "Installing Dependencies");
    }

    #[test]
    fn falls_back_to_first_meaningful_line() {
        let content = "[info] booting\n2026-01-01 starting\n# header\nok\n✅ reticulating splines now\n";
        assert_eq!(describe(content, "t"), "Reticulating splines now");

        let long = format!("{}\n", "x".repeat(120));
        assert_eq!(describe(&long, "abcdef1234"), "Background Task abcdef1");
    }

    #[test]
    fn fallback_line_is_capped() {
        let line = "processing ".repeat(7);
        let described = describe(line.trim(), "t");
        assert_eq!(described.chars().count(), 50);
        assert!(described.starts_with("Processing processing"));
    }
}
