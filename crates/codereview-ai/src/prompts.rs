use codereview_core::AnalysisSettings;

/// System prompt for review requests.
pub const REVIEW_SYSTEM_PROMPT: &str = "You are a senior software engineer performing a code review. \
You give specific, actionable suggestions that reference the code you were shown. \
You answer with a JSON array of strings and nothing else.";

const PERFORMANCE_INCLUDE: &str = "Include performance guidance: point out inefficient loops, \
repeated work, poor data structure choices and avoidable allocations.";
const PERFORMANCE_EXCLUDE: &str = "Do not include performance-related suggestions.";

const SECURITY_INCLUDE: &str = "Include security guidance: point out injection risks, unsafe \
evaluation of input, hard-coded secrets and missing validation.";
const SECURITY_EXCLUDE: &str = "Do not include security-related suggestions.";

/// Instruction payload for one snippet.
pub fn build_review_prompt(code: &str, settings: &AnalysisSettings, limit: usize) -> String {
    let performance = if settings.performance {
        PERFORMANCE_INCLUDE
    } else {
        PERFORMANCE_EXCLUDE
    };
    let security = if settings.security {
        SECURITY_INCLUDE
    } else {
        SECURITY_EXCLUDE
    };

    format!(
        "Review the following code and return at most {limit} improvement suggestions, \
most important first. Cover readability, maintainability, naming and structure.\n\
{performance}\n\
{security}\n\n\
Respond with a JSON array of strings, one suggestion per element, for example:\n\
[\"Rename `x` to describe what it holds.\", \"Extract the parsing loop into a function.\"]\n\
Respond with [] if the code needs no changes.\n\n\
Code:\n```\n{code}\n```"
    )
}
