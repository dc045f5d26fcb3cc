//! Local instruction templates.
//!
//! Pools are keyed by intervention type and by the kind of project being
//! supervised. `{signals}` expands to the strongest matched signals and
//! `{stage}` to the detected development stage.

use serde::{Deserialize, Serialize};

use crate::models::InterventionType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ProjectKind {
    Web,
    Api,
    Data,
    Automation,
    General,
}

const PROJECT_KEYWORDS: &[(ProjectKind, &[&str])] = &[
    (
        ProjectKind::Web,
        &["web", "frontend", "react", "html", "css", "网页", "前端"],
    ),
    (
        ProjectKind::Api,
        &["api", "backend", "server", "endpoint", "rest", "grpc", "后端", "接口"],
    ),
    (
        ProjectKind::Data,
        &["data", "database", "sql", "etl", "pipeline", "analytics", "数据"],
    ),
    (
        ProjectKind::Automation,
        &["automation", "script", "bot", "workflow", "自动化"],
    ),
];

impl ProjectKind {
    /// First kind whose keywords appear in the project description.
    pub fn detect(project_context: &str) -> Self {
        let lowered = project_context.to_lowercase();
        PROJECT_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| contains_word(&lowered, keyword)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ProjectKind::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Web => "web",
            ProjectKind::Api => "api",
            ProjectKind::Data => "data",
            ProjectKind::Automation => "automation",
            ProjectKind::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DevStage {
    Requirements,
    Implementation,
    ErrorHandling,
    Documentation,
    Testing,
    Delivery,
    General,
}

// Checked in order; error handling comes first so a failing test run reads as a fix-up.
const STAGE_KEYWORDS: &[(DevStage, &[&str])] = &[
    (
        DevStage::ErrorHandling,
        &["error", "exception", "traceback", "failed", "bug", "错误", "失败", "异常"],
    ),
    (
        DevStage::Testing,
        &["test", "tests", "assert", "coverage", "pytest", "测试"],
    ),
    (
        DevStage::Documentation,
        &["readme", "docs", "documentation", "docstring", "文档"],
    ),
    (
        DevStage::Delivery,
        &["deploy", "release", "publish", "docker", "部署", "发布"],
    ),
    (
        DevStage::Requirements,
        &["requirement", "requirements", "spec", "design", "plan", "需求", "设计"],
    ),
    (
        DevStage::Implementation,
        &["implement", "implemented", "function", "class", "module", "refactor", "实现", "代码"],
    ),
];

impl DevStage {
    pub fn detect(raw_text: &str) -> Self {
        let lowered = raw_text.to_lowercase();
        STAGE_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| contains_word(&lowered, keyword)))
            .map(|(stage, _)| *stage)
            .unwrap_or(DevStage::General)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            DevStage::Requirements => "requirements and design",
            DevStage::Implementation => "core implementation",
            DevStage::ErrorHandling => "error handling",
            DevStage::Documentation => "documentation",
            DevStage::Testing => "testing",
            DevStage::Delivery => "delivery",
            DevStage::General => "general development",
        }
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    if !needle.is_ascii() {
        return haystack.contains(needle);
    }
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == needle)
}

pub fn pool(intervention: InterventionType, kind: ProjectKind) -> &'static [&'static str] {
    use InterventionType as I;
    use ProjectKind as P;

    match (intervention, kind) {
        (I::Continue, P::Web) => &[
            "Nice, that part looks done. Move on to the next page or component, keep the layout simple and wire it to real data before polishing styles.",
            "Good progress on the UI. Pick the next user-facing feature, build a working version first and check it renders in the browser ({stage}).",
        ],
        (I::Continue, P::Api) => &[
            "That looks complete. Continue with the next endpoint, keep request validation minimal and make sure the happy path returns a correct response.",
            "Good, the handler is in place. Implement the next route now and add a quick request example so we can confirm it works end to end.",
        ],
        (I::Continue, P::Data) => &[
            "Looks finished. Continue with the next step of the pipeline, run it on a small sample and confirm the output shape before scaling up.",
            "Good work on that stage. Move on to the next transformation, keep it readable and print a few result rows so we can verify it quickly.",
        ],
        (I::Continue, P::Automation) => &[
            "That step is done. Continue with the next task in the workflow, keep the script straightforward and log each action it performs.",
            "Nice, the automation runs. Implement the next step now and do a dry run on safe input before touching anything real ({stage}).",
        ],
        (I::Continue, P::General) => &[
            "Good, that looks complete. Continue with the next core feature, build the simplest working version first and leave polish for later.",
            "Progress looks solid ({stage}). Move on to the next item on the list and keep going until the main functionality works end to end.",
        ],
        (I::Resolve, P::Web) => &[
            "I see a problem in the output ({signals}). Fix it with the simplest change that makes the page work again, then continue with the feature.",
            "The browser build is failing ({signals}). Check the console message, apply the smallest fix and reload to confirm before moving on.",
        ],
        (I::Resolve, P::Api) => &[
            "The service reported a failure ({signals}). Find the root cause in the handler or its config, apply a minimal fix and retry the request.",
            "There is an error to resolve ({signals}). Check connection settings and error handling on the server side, fix it and rerun the call.",
        ],
        (I::Resolve, P::Data) => &[
            "The data step failed ({signals}). Check the connection and the schema assumptions, fix the simplest cause and rerun on a small sample.",
            "Something broke in the pipeline ({signals}). Read the full error, correct the query or transformation and verify the row counts again.",
        ],
        (I::Resolve, P::Automation) => &[
            "The script hit an error ({signals}). Fix the failing step with the most direct change, then run the workflow again from that point.",
            "Automation stopped with a failure ({signals}). Add a clear check around the failing action, fix the cause and rerun the script.",
        ],
        (I::Resolve, P::General) => &[
            "There is an error to fix ({signals}). Use the simplest fix that works, rerun to confirm it is gone and then continue with the main task.",
            "Something failed ({signals}). Look at the full message, fix the root cause rather than the symptom and verify before moving on.",
        ],
        (I::Question, P::Web) => &[
            "Go with the option that gets a working page fastest. Use sensible defaults for anything unspecified and keep going ({signals}).",
            "Either choice is fine for now. Pick the simpler approach for the UI, note the decision in a comment and continue building.",
        ],
        (I::Question, P::Api) => &[
            "Choose the most conventional option for the API, follow the existing patterns in the codebase and continue implementing ({signals}).",
            "Use reasonable defaults here. Keep the endpoint contract simple, document the choice briefly and carry on with the implementation.",
        ],
        (I::Question, P::Data) => &[
            "Pick the approach that keeps the data flow simplest. Use the existing schema where possible and continue with the pipeline ({signals}).",
            "Go with the option that is easiest to verify on sample data. Note the assumption and keep moving with the next transformation.",
        ],
        (I::Question, P::Automation) => &[
            "Choose the safest and simplest option for the workflow, make it configurable later if needed and continue with the script ({signals}).",
            "Yes, proceed with the straightforward approach. Keep the steps explicit and logged, then carry on with the remaining automation.",
        ],
        (I::Question, P::General) => &[
            "Yes, please proceed with the simplest option that works. Use sensible defaults for anything unclear and continue ({signals}).",
            "Go ahead with your suggested approach. Keep it minimal, note any assumptions you made and continue with the main functionality.",
        ],
        (I::Generic, P::Web) => &[
            "Please continue working on the frontend. Focus on the next visible feature and make sure the page still builds ({stage}).",
            "Keep going with the web app. If something is blocking you, skip the detail for now and finish the core user flow first.",
        ],
        (I::Generic, P::Api) => &[
            "Please continue with the backend. Finish the next endpoint and make sure the server still starts cleanly ({stage}).",
            "Keep going with the API. If a detail is blocking progress, stub it for now and complete the main request flow first.",
        ],
        (I::Generic, P::Data) => &[
            "Please continue with the data work. Finish the current step of the pipeline and check the output on a small sample ({stage}).",
            "Keep going with the pipeline. If something is unclear, make a reasonable assumption and move to the next transformation.",
        ],
        (I::Generic, P::Automation) => &[
            "Please continue with the automation. Finish the current step and make sure the script runs end to end ({stage}).",
            "Keep going with the workflow. Skip non-essential details for now and get the main sequence of actions working first.",
        ],
        (I::Generic, P::General) => &[
            "Please continue with the current task. Focus on getting the core functionality working and leave optimisation for later ({stage}).",
            "Keep going. If you are stuck on a detail, skip it for now, finish the main feature and come back to it afterwards.",
        ],
    }
}

/// Expand `{signals}` and `{stage}` placeholders.
pub fn render(template: &str, signals: &[&str], stage: DevStage) -> String {
    let signals = if signals.is_empty() {
        "the latest output".to_string()
    } else {
        signals.join(", ")
    };
    template
        .replace("{signals}", &signals)
        .replace("{stage}", stage.describe())
}
