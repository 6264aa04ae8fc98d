// Workflow Templates - {{token}} interpolation for email subjects, bodies and notifications

use recruit_shared::ApplicationSnapshot;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([^{}]*)\}\}").expect("token pattern compiles")
});

static BRACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{+|\}\}+").expect("brace pattern compiles"));

/// Nested templates such as `{{ {{candidate_name}} }}` need one pass per level.
const MAX_PASSES: usize = 4;

/// Drops every run of two or more braces, repeating until none are left.
fn scrub(text: &str) -> String {
    let mut scrubbed = text.to_string();
    while BRACE_RUN.is_match(&scrubbed) {
        scrubbed = BRACE_RUN.replace_all(&scrubbed, "").into_owned();
    }
    scrubbed
}

/// Values available to action templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<&'static str, String>,
}

impl TemplateContext {
    pub fn from_snapshot(application: &ApplicationSnapshot) -> Self {
        let candidate = &application.candidate;
        let mut values = HashMap::new();
        values.insert("candidate_name", candidate.full_name());
        values.insert("candidate_first_name", candidate.first_name.clone());
        values.insert("candidate_email", candidate.email.clone());
        values.insert("job_title", application.job.title.clone());
        values.insert("stage_name", application.stage_name().to_string());
        for value in values.values_mut() {
            *value = scrub(value);
        }
        Self { values }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }

    /// Replaces every `{{token}}`. Unknown tokens render as the empty string,
    /// and no `{{` or `}}` survives into the output.
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for _ in 0..MAX_PASSES {
            if !TOKEN.is_match(&rendered) {
                break;
            }
            rendered = TOKEN
                .replace_all(&rendered, |caps: &Captures| {
                    self.get(caps[1].trim()).unwrap_or_default().to_string()
                })
                .into_owned();
        }
        scrub(&rendered)
    }
}
