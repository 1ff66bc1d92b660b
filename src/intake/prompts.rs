//! 研究任务 Prompt 与会话标题

use chrono::{DateTime, SecondsFormat, Utc};

use super::text::{generate_slug, is_github_url, title_from_text, title_from_url};
use super::{RequestType, ResearchRequest};

const SLUG_MAX_LENGTH: usize = 50;
const DEFAULT_TITLE_LENGTH: usize = 60;
const SESSION_TITLE_LENGTH: usize = 50;
const QUOTE_LENGTH: usize = 280;

/// 生成发给 Agent 的研究 Prompt。产出写入 `{research_root}/{slug}/REPORT.md`。
pub fn generate_research_prompt(
    request: &ResearchRequest,
    research_root: &str,
    now: DateTime<Utc>,
) -> String {
    let seed = match (&request.url, &request.text) {
        (Some(url), _) => url.clone(),
        (None, Some(text)) => text.chars().take(50).collect(),
        (None, None) => "research".to_string(),
    };
    let slug = generate_slug(&seed, SLUG_MAX_LENGTH, now);
    let base_path = format!("{}/{}", research_root.trim_end_matches('/'), slug);
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);

    match (&request.kind, &request.url) {
        (RequestType::Url, Some(url)) => url_prompt(url, &base_path, &timestamp),
        _ => x_post_prompt(
            request.text.as_deref().unwrap_or_default(),
            &request.contained_urls,
            &base_path,
            &timestamp,
        ),
    }
}

fn url_prompt(url: &str, base_path: &str, timestamp: &str) -> String {
    let is_github = is_github_url(url);
    let title = title_from_url(url);

    let implementation_phase = if is_github {
        format!(
            "2. **Implementation Phase**
   - Clone the repository to `{base_path}/repo/`
   - Explore the codebase structure and understand the architecture
   - Run any available tests or examples
   - Identify the key features and how they work"
        )
    } else {
        format!(
            "2. **Implementation Phase**
   - Create folder: `{base_path}/`
   - Implement the KEY examples (focus on 2-3 most important ones)
   - If it's a library/tool: create a working demo
   - If it's a concept: create a minimal proof-of-concept"
        )
    };
    let kind = if is_github {
        "GitHub Repository"
    } else {
        "Web Article/Tutorial"
    };

    format!(
        "## Research & Implementation Task

I found an interesting resource that I want to learn from:

**URL:** {url}
**Type:** {kind}

### Your Mission:

1. **Research Phase**
   - Visit and thoroughly read the content at this URL
   - Identify the main concepts, techniques, or tools being discussed
   - Note the KEY code examples or implementation details (not everything)

{implementation_phase}

3. **Testing Phase**
   - Run any available tests
   - Verify your implementation works as expected
   - Document any issues, adaptations, or environment requirements

4. **Report Generation**
   Create a comprehensive markdown report at `{base_path}/REPORT.md` with this structure:

```markdown
# Research Report: {title}

## Summary
[2-3 sentences about what this is and why it's interesting]

## Key Concepts
- [Main idea 1]
- [Main idea 2]
- [Main idea 3]

## Implementation Details
### What I Built
[Description of implementation]

### Key Files
- `path/to/file` - [purpose]

### How to Run
```bash
# Commands to run the implementation
```

## Test Results
- [x] [Test that passed]
- [ ] [Test that failed or wasn't available]

### Issues Encountered
[Any problems and how they were solved]

## Applications
[Practical use cases for this knowledge]

## Assessment
**Quality:** [1-5 stars]
**Usefulness:** [1-5 stars]
**Recommendation:** [Should others check this out? Why?]

## Source
- **URL:** {url}
- **Researched:** {timestamp}
```

### Guidelines:
- Focus on KEY examples only, not exhaustive coverage
- Make implementations actually work
- Be honest about what doesn't work
- Be efficient with your time
"
    )
}

fn x_post_prompt(text: &str, urls: &[String], base_path: &str, timestamp: &str) -> String {
    let title = title_from_text(text, DEFAULT_TITLE_LENGTH);
    let has_github = urls.iter().any(|u| is_github_url(u));
    let has_urls = !urls.is_empty();
    let url_list = urls
        .iter()
        .map(|u| format!("- {}", u))
        .collect::<Vec<_>>()
        .join("\n");

    let urls_section = if has_urls {
        format!("**URLs in post:**\n{}", url_list)
    } else {
        String::new()
    };

    let build_phase = if has_github {
        format!(
            "- Clone any GitHub repositories to `{base_path}/repo/`
   - Explore the code, run tests if available
   - Understand what makes it interesting"
        )
    } else if has_urls {
        "- Visit the URLs to gather more context
   - Build a proof-of-concept of the idea described
   - Focus on the core concept, not everything"
            .to_string()
    } else {
        "- Research the topic mentioned
   - Build a minimal proof-of-concept of the idea
   - Focus on demonstrating the core concept"
            .to_string()
    };

    let context_step = if has_urls {
        "- Visit URLs for additional context"
    } else {
        "- Research the topic to understand it better"
    };

    let mut quote: String = text.chars().take(QUOTE_LENGTH).collect();
    if text.chars().count() > QUOTE_LENGTH {
        quote.push_str("...");
    }

    let referenced = if has_urls {
        format!("## Referenced URLs\n{}", url_list)
    } else {
        String::new()
    };

    format!(
        "## Research & Build from X Post

I found an interesting X/Twitter post:

**Tweet:**
> {text}

{urls_section}

### Your Mission:

1. **Understand the Idea**
   - Parse what the post is describing
   - Identify the core concept or technique
   {context_step}

2. **Build**
   - Create folder: `{base_path}/`
   {build_phase}

3. **Test & Verify**
   - Test your implementation
   - Verify it demonstrates the concept
   - Document what works

4. **Generate Report**
   Create `{base_path}/REPORT.md` with this structure:

```markdown
# Research: {title}

## Original Post
> {quote}

{referenced}

## What I Built
[Description of your implementation]

### Key Files
- `path/to/file` - [purpose]

### How to Run
```bash
# Commands to run
```

## Key Findings
- [Finding 1]
- [Finding 2]

## Test Results
[What worked, what didn't]

## Potential Applications
[Real-world uses for this]

## Assessment
**Is this useful?** [Yes/No/Maybe]
**Quality of idea:** [1-5 stars]
**Worth exploring further?** [Yes/No]

## Source
- **Post:** X/Twitter
- **Researched:** {timestamp}
```

### Guidelines:
- Focus on the CORE idea, not everything mentioned
- Build something minimal but functional
- Be practical and efficient
"
    )
}

/// 会话标题：`Build & Learn: ...`
pub fn generate_session_title(request: &ResearchRequest, now: DateTime<Utc>) -> String {
    if let (RequestType::Url, Some(url)) = (&request.kind, &request.url) {
        return format!("Build & Learn: {}", title_from_url(url));
    }
    if let Some(text) = &request.text {
        return format!(
            "Build & Learn: {}",
            title_from_text(text, SESSION_TITLE_LENGTH)
        );
    }
    format!("Build & Learn: Research {}", now.format("%Y-%m-%d"))
}
