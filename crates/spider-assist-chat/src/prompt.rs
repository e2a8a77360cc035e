//! System prompt construction for the three chat modes.
//!
//! Every function here is pure: the same inputs always produce the same text.

/// HTML characters included in the system prompt of a grounded generation turn.
pub const GROUNDED_HTML_LIMIT: usize = 6_000;
/// HTML characters included when refining existing code.
pub const EDIT_HTML_LIMIT: usize = 5_000;

/// A captured target page used to ground generation.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HtmlContext {
    pub url: String,
    pub title: String,
    pub html_content: String,
}

impl HtmlContext {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        html_content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            html_content: html_content.into(),
        }
    }
}

/// Prompting mode of a chat session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum PromptMode {
    /// Generate a spider from the conversation alone.
    #[default]
    Plain,
    /// Generate a spider for a captured page.
    HtmlGrounded { page: HtmlContext },
    /// Refine existing spider code, optionally with the target page.
    Edit {
        existing_code: String,
        page: Option<HtmlContext>,
    },
}

impl PromptMode {
    /// Collapses modes whose inputs are missing: an edit without code
    /// behaves like grounded generation when a page is known, else plain.
    pub fn resolved(&self) -> PromptMode {
        match self {
            PromptMode::Edit {
                existing_code,
                page,
            } if existing_code.trim().is_empty() => match page {
                Some(page) => PromptMode::HtmlGrounded { page: page.clone() },
                None => PromptMode::Plain,
            },
            other => other.clone(),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            PromptMode::Plain => "plain",
            PromptMode::HtmlGrounded { .. } => "html_grounded",
            PromptMode::Edit { .. } => "edit",
        }
    }

    /// Page attached to the mode, if any.
    pub fn page(&self) -> Option<&HtmlContext> {
        match self {
            PromptMode::Plain => None,
            PromptMode::HtmlGrounded { page } => Some(page),
            PromptMode::Edit { page, .. } => page.as_ref(),
        }
    }
}

/// Inputs for a one-shot "write me a spider" request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SpiderRequest {
    pub description: String,
    pub target_url: Option<String>,
    pub spider_name: Option<String>,
}

/// Returns at most `limit` characters of `text`. Hard cut, not sentence-aware.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Builds the system instruction for `mode`.
pub fn system_prompt(mode: &PromptMode) -> String {
    match mode.resolved() {
        PromptMode::Plain => plain_prompt(),
        PromptMode::HtmlGrounded { page } => grounded_prompt(&page),
        PromptMode::Edit {
            existing_code,
            page,
        } => edit_prompt(&existing_code, page.as_ref()),
    }
}

/// Opening assistant message that seeds the visible conversation for `mode`.
pub fn greeting(mode: &PromptMode) -> String {
    match mode.resolved() {
        PromptMode::Edit { page: Some(page), .. } => format!(
            "I've loaded your existing spider code and the HTML structure of \"{}\".\n\n\
             How would you like to improve this spider? For example:\n\
             - Add new data fields\n\
             - Fix errors\n\
             - Tighten the XPath selectors\n\
             - Add exception handling\n\
             - Clean up extracted data\n\
             and so on...",
            page.title
        ),
        PromptMode::Edit { page: None, .. } => "I've loaded your existing spider code.\n\n\
             How would you like to improve it? For example:\n\
             - Add new data fields\n\
             - Fix errors or exceptions\n\
             - Restructure the code\n\
             - Add data validation\n\
             and so on..."
            .to_string(),
        PromptMode::HtmlGrounded { page } => format!(
            "I've fetched the page content of \"{}\".\n\n\
             Which data should I extract from this page? For example:\n\
             - Titles\n- Links\n- Images\n- Prices\n- Ratings\n\
             and so on...",
            page.title
        ),
        PromptMode::Plain => "Hi! I'm the AI spider assistant. Tell me which site you want to \
             crawl and which data you need, and I'll generate the code for you."
            .to_string(),
    }
}

/// User prompt asking for a complete spider in one response.
pub fn spider_request(request: &SpiderRequest) -> String {
    let mut prompt = format!(
        "Please generate a spider for me:\n\nRequirement: {}\n",
        request.description
    );
    if let Some(url) = request.target_url.as_deref().filter(|u| !u.trim().is_empty()) {
        prompt.push_str(&format!("Target site: {url}\n"));
    }
    if let Some(name) = request
        .spider_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
    {
        prompt.push_str(&format!("Spider name: {name}\n"));
    }
    prompt.push_str("\nOutput the complete Python code directly, including the full class definition.");
    prompt
}

fn plain_prompt() -> String {
    r#"You are a professional Python web scraping assistant. Your task is to help users create spider code that conforms to the BaseSpider specification.

## Spider Specification

1. Must inherit from BaseSpider class
2. Must define the following fields:
   - name: str (spider name, lowercase letters, numbers, underscores)
   - start_url: str (starting URL)
3. Must implement parse method:
   ```python
   def parse(self, raw_content: str, context: ParseContext) -> Dict[str, Any]:
       # Parsing logic
       pass
   ```

## Available Tools

- lxml.html.fromstring() - Parse HTML
- XPath expressions - Extract data
- tree.xpath('//div[@class="title"]/text()') - Example

## Code Template

```python
from typing import Dict, Any
from lxml import html
from spiders.core.base_spider import BaseSpider, ParseContext


class MySpider(BaseSpider):
    name = "my_spider"
    start_url = "https://example.com"

    def parse(self, raw_content: str, context: ParseContext) -> Dict[str, Any]:
        tree = html.fromstring(raw_content)

        # Extract data
        data = {
            "title": tree.xpath('//h1/text()')[0] if tree.xpath('//h1/text()') else None,
        }

        return data
```

## Important Notes

1. Generate complete spider class code
2. Use XPath to extract data
3. Handle possible null values (use conditional statements or try-except)
4. Add comments in Chinese
5. Ensure code can run directly

Please generate code based on user requirements."#
        .to_string()
}

fn grounded_prompt(page: &HtmlContext) -> String {
    let html_preview = truncate_chars(&page.html_content, GROUNDED_HTML_LIMIT);
    let url = &page.url;
    format!(
        r#"You are a professional Python web scraping assistant. The user wants to scrape the following webpage:

Target URL: {url}

Page HTML content (partial):
```html
{html_preview}
```

## Your Task

1. **Carefully analyze the HTML structure above**
2. Based on user requirements, use XPath or CSS selectors to extract data
3. Generate spider code that conforms to BaseSpider specification

## Spider Specification

Must include the following structure:

```python
from typing import Dict, Any
from lxml import html
from spiders.core.base_spider import BaseSpider, ParseContext


class MySpider(BaseSpider):
    name = "spider_name"  # lowercase letters, numbers, underscores
    start_url = "{url}"

    def parse(self, raw_content: str, context: ParseContext) -> Dict[str, Any]:
        tree = html.fromstring(raw_content)

        # Extract data
        data = {{}}

        return data
```

## Important Tips

1. **Carefully analyze the HTML structure provided above**, find the correct tags and attributes
2. Use accurate XPath expressions, for example:
   - `tree.xpath('//div[@class="title"]/text()')`
   - `tree.xpath('//span[@id="price"]/text()')`
3. **Must handle null values**, use the following pattern:
   ```python
   title_list = tree.xpath('//h1/text()')
   title = title_list[0] if title_list else None
   ```
4. Returned data must be in dictionary format
5. Add Chinese comments to explain each extraction step

Please generate code based on user requirements."#
    )
}

fn edit_prompt(existing_code: &str, page: Option<&HtmlContext>) -> String {
    let mut prompt = format!(
        "You are a professional Python spider development assistant.\n\n\
         # Current Task\n\
         The user is editing an existing spider and needs your help improving it.\n\n\
         # Existing Code\n\
         ```python\n{existing_code}\n```\n"
    );

    if let Some(page) = page {
        prompt.push_str(&format!(
            "\n# Target Site\n\
             - URL: {}\n\
             - Title: {}\n\n\
             # Target Site HTML Structure (first {EDIT_HTML_LIMIT} characters)\n\
             ```html\n{}\n```\n",
            page.url,
            page.title,
            truncate_chars(&page.html_content, EDIT_HTML_LIMIT)
        ));
    }

    prompt.push_str(
        "\n# Your Task\n\
         1. Understand the logic and structure of the existing code\n\
         2. Modify the code according to the user's improvement request\n\
         3. Keep the code style consistent\n\
         4. Change only what is necessary; do not rewrite the whole spider\n\
         5. Add clear Chinese comments describing each change\n\n\
         # Output Requirements\n\
         - Output the complete improved Python code\n\
         - Wrap it in a ```python code block\n\
         - Keep the existing class name, method names and overall structure\n\
         - Make sure the code runs as-is\n\
         - Keep the code readable and well formatted\n\n\
         # Notes\n\
         - Check every XPath result for emptiness\n\
         - Handle empty values with a conditional: value = items[0] if items else None\n\
         - Avoid indexing with [0] directly to prevent IndexError\n\
         - Add the data cleaning and validation that is needed\n\
         - Keep the same imports and class structure as the existing code\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> HtmlContext {
        HtmlContext::new("https://books.example/list", "Book List", html)
    }

    #[test]
    fn truncation_is_a_hard_character_cutoff() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("爬虫代码", 2), "爬虫");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn builder_is_deterministic() {
        let mode = PromptMode::HtmlGrounded {
            page: page("<h1>x</h1>"),
        };
        assert_eq!(system_prompt(&mode), system_prompt(&mode));
        assert_eq!(system_prompt(&PromptMode::Plain), plain_prompt());
    }

    #[test]
    fn grounded_prompt_embeds_url_and_truncated_html() {
        let html = format!("{}{}", "a".repeat(GROUNDED_HTML_LIMIT), "TAIL_MARKER");
        let prompt = system_prompt(&PromptMode::HtmlGrounded { page: page(&html) });
        assert!(prompt.contains("Target URL: https://books.example/list"));
        assert!(prompt.contains("start_url = \"https://books.example/list\""));
        assert!(prompt.contains(&"a".repeat(GROUNDED_HTML_LIMIT)));
        assert!(!prompt.contains("TAIL_MARKER"));
        assert!(prompt.contains("data = {}"));
    }

    #[test]
    fn edit_prompt_includes_code_and_optional_page_section() {
        let code = "class BookSpider(BaseSpider):\n    name = \"books\"";
        let without_page = system_prompt(&PromptMode::Edit {
            existing_code: code.into(),
            page: None,
        });
        assert!(without_page.contains(&format!("```python\n{code}\n```")));
        assert!(!without_page.contains("# Target Site"));

        let html = format!("{}{}", "b".repeat(EDIT_HTML_LIMIT), "CUT_HERE");
        let with_page = system_prompt(&PromptMode::Edit {
            existing_code: code.into(),
            page: Some(page(&html)),
        });
        assert!(with_page.contains("- Title: Book List"));
        assert!(with_page.contains(&"b".repeat(EDIT_HTML_LIMIT)));
        assert!(!with_page.contains("CUT_HERE"));
    }

    #[test]
    fn edit_without_code_falls_back() {
        let grounded = PromptMode::Edit {
            existing_code: "  ".into(),
            page: Some(page("<p/>")),
        };
        assert!(matches!(grounded.resolved(), PromptMode::HtmlGrounded { .. }));
        let plain = PromptMode::Edit {
            existing_code: String::new(),
            page: None,
        };
        assert_eq!(plain.resolved(), PromptMode::Plain);
        assert_eq!(system_prompt(&plain), system_prompt(&PromptMode::Plain));
    }

    #[test]
    fn greeting_mentions_page_title_when_grounded() {
        let text = greeting(&PromptMode::HtmlGrounded { page: page("") });
        assert!(text.contains("\"Book List\""));
        assert!(greeting(&PromptMode::Plain).starts_with("Hi!"));
    }

    #[test]
    fn spider_request_omits_absent_fields() {
        let full = spider_request(&SpiderRequest {
            description: "collect book titles".into(),
            target_url: Some("https://books.example".into()),
            spider_name: Some("books".into()),
        });
        assert!(full.contains("Requirement: collect book titles"));
        assert!(full.contains("Target site: https://books.example"));
        assert!(full.contains("Spider name: books"));

        let bare = spider_request(&SpiderRequest {
            description: "collect prices".into(),
            ..SpiderRequest::default()
        });
        assert!(!bare.contains("Target site"));
        assert!(!bare.contains("Spider name"));
    }
}
