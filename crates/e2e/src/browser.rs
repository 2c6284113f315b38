//! Playwright script generation and execution
//!
//! A flow's steps are rendered into a standalone Node script driving the
//! `playwright` package, then executed once per spec so page state survives
//! across steps. The browser itself stays an external collaborator; this
//! module only talks to it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::spec::TestStep;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    /// Parse a browser name, defaulting to chromium.
    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Configuration for the driver.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// App origin that relative `navigate` URLs resolve against.
    pub app_base_url: String,

    /// Directory screenshots land in.
    pub screenshot_dir: PathBuf,

    pub browser: Browser,

    pub headless: bool,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Default per-action timeout inside the page.
    pub default_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            app_base_url: "http://localhost:5002".to_string(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            default_timeout_ms: 35_000,
        }
    }
}

/// Renders flows to Playwright scripts and runs them under `node`.
pub struct BrowserDriver {
    config: BrowserConfig,
}

/// A JS string literal. JSON string syntax is valid JavaScript, so this
/// handles quoting and escaping in one place.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

/// A JS `new RegExp(...)` from a pattern string.
fn js_regex(pattern: &str) -> String {
    format!("new RegExp({})", js_str(pattern))
}

impl BrowserDriver {
    pub fn new(config: BrowserConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        std::fs::create_dir_all(&config.screenshot_dir)?;
        Ok(Self { config })
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let status = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Render a full flow to a Node script. `storage_state` attaches a
    /// cached authenticated session to the context.
    pub fn build_script(&self, steps: &[TestStep], storage_state: Option<&Path>) -> String {
        let mut context_options = vec![format!(
            "viewport: {{ width: {}, height: {} }}",
            self.config.viewport_width, self.config.viewport_height
        )];

        if let Some(path) = storage_state {
            context_options.push(format!(
                "storageState: {}",
                js_str(&path.to_string_lossy())
            ));
        }

        // The clipboard is only grantable as a permission on chromium; the
        // recovery-code pages use it.
        if self.config.browser == Browser::Chromium {
            context_options.push("permissions: ['clipboard-read', 'clipboard-write']".to_string());
        }

        let mut script = format!(
            r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    {context_options}
  }});
  const page = await context.newPage();
  page.setDefaultTimeout({timeout});
  const baseUrl = {base_url};

  try {{
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            context_options = context_options.join(",\n    "),
            timeout = self.config.default_timeout_ms,
            base_url = js_str(&self.config.app_base_url),
        );

        for (index, step) in steps.iter().enumerate() {
            script.push_str(&format!("\n    // Step {}: {}\n", index + 1, step.label()));
            script.push_str(&self.step_to_js(step));
            script.push('\n');
        }

        script.push_str(
            r#"
    console.log(JSON.stringify({ success: true }));
  } catch (error) {
    console.error(JSON.stringify({ success: false, error: error.message }));
    process.exit(1);
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    fn step_to_js(&self, step: &TestStep) -> String {
        match step {
            TestStep::Navigate { url } => {
                if url.starts_with("http://") || url.starts_with("https://") {
                    format!("    await page.goto({});", js_str(url))
                } else {
                    format!("    await page.goto(baseUrl + {});", js_str(url))
                }
            }
            TestStep::WaitForUrl { url, timeout_ms } => {
                let timeout = timeout_ms.unwrap_or(self.config.default_timeout_ms);
                format!(
                    "    await page.waitForURL({}, {{ timeout: {} }});",
                    js_str(url),
                    timeout
                )
            }
            TestStep::WaitForCaptcha => [
                "    await page.waitForLoadState('networkidle');",
                "    await page.waitForSelector('aside#cf-turnstile', { state: 'attached' });",
            ]
            .join("\n"),
            TestStep::FillLabel { label, value } => format!(
                "    await page.getByLabel({}).fill({});",
                js_str(label),
                js_str(value)
            ),
            TestStep::FillTextbox { name, value } => format!(
                "    await page.getByRole('textbox', {{ name: {} }}).fill({});",
                js_str(name),
                js_str(value)
            ),
            TestStep::ClickButton { name } => format!(
                "    await page.getByRole('button', {{ name: {} }}).click();",
                js_str(name)
            ),
            TestStep::ClickLink { name } => format!(
                "    await page.getByRole('link', {{ name: {} }}).click();",
                js_str(name)
            ),
            TestStep::Press { key } => {
                format!("    await page.keyboard.press({});", js_str(key))
            }
            TestStep::ExpectTitle { pattern } => format!(
                r#"    {{
      const title = await page.title();
      if (!{regex}.test(title)) {{
        throw new Error('title mismatch: ' + title);
      }}
    }}"#,
                regex = js_regex(pattern)
            ),
            TestStep::ExpectUrl { pattern } => format!(
                r#"    {{
      await page.waitForURL({regex});
    }}"#,
                regex = js_regex(pattern)
            ),
            TestStep::ExpectText { text, exact } => {
                if *exact {
                    // Whole-message match, the way validation errors render
                    // in their own element.
                    let anchored = format!("^{}$", regex::escape(text));
                    format!(
                        "    await page.locator('div').filter({{ hasText: {} }}).first().waitFor({{ state: 'visible' }});",
                        js_regex(&anchored)
                    )
                } else {
                    format!(
                        "    await page.getByText({}).first().waitFor({{ state: 'visible' }});",
                        js_str(text)
                    )
                }
            }
            TestStep::ExpectButton { name } => format!(
                "    await page.getByRole('button', {{ name: {} }}).waitFor({{ state: 'visible' }});",
                js_str(name)
            ),
            TestStep::ExpectLink { name } => format!(
                "    await page.getByRole('link', {{ name: {} }}).waitFor({{ state: 'visible' }});",
                js_str(name)
            ),
            TestStep::ExpectLabel { label } => format!(
                "    await page.getByLabel({}).waitFor({{ state: 'visible' }});",
                js_str(label)
            ),
            TestStep::ExpectAttribute {
                selector,
                attribute,
                value,
            } => format!(
                r#"    {{
      const locator = page.locator({selector}).first();
      await locator.waitFor({{ state: 'attached' }});
      const actual = await locator.getAttribute({attribute});
      if (actual !== {value}) {{
        throw new Error({attribute} + ' = ' + actual);
      }}
    }}"#,
                selector = js_str(selector),
                attribute = js_str(attribute),
                value = js_str(value),
            ),
            TestStep::Screenshot { name } => {
                let path = self.config.screenshot_dir.join(format!("{name}.png"));
                format!(
                    "    await page.screenshot({{ path: {} }});",
                    js_str(&path.to_string_lossy())
                )
            }
            TestStep::Sleep { ms } => format!("    await page.waitForTimeout({ms});"),
        }
    }

    /// Render and run a flow. The first failing step aborts the script and
    /// surfaces as a [`E2eError::Playwright`] error.
    pub async fn run(&self, steps: &[TestStep], storage_state: Option<&Path>) -> E2eResult<()> {
        let script = self.build_script(steps, storage_state);

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("flow.js");
        std::fs::write(&script_path, &script)?;

        debug!("running Playwright script: {}", script_path.display());

        let output = TokioCommand::new("node")
            .arg(&script_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(E2eError::Playwright(format!(
                "script failed:\nstdout: {stdout}\nstderr: {stderr}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> BrowserDriver {
        // Bypass the constructor: no Playwright install needed to render.
        BrowserDriver {
            config: BrowserConfig::default(),
        }
    }

    #[test]
    fn navigate_resolves_relative_urls_against_the_app() {
        let script = driver().build_script(
            &[TestStep::Navigate {
                url: "/auth/login".into(),
            }],
            None,
        );
        assert!(script.contains(r#"await page.goto(baseUrl + "/auth/login");"#));
        assert!(script.contains(r#"const baseUrl = "http://localhost:5002";"#));
    }

    #[test]
    fn navigate_keeps_absolute_urls() {
        let script = driver().build_script(
            &[TestStep::Navigate {
                url: "https://accounts.google.com/".into(),
            }],
            None,
        );
        assert!(script.contains(r#"await page.goto("https://accounts.google.com/");"#));
    }

    #[test]
    fn storage_state_is_attached_to_the_context() {
        let script = driver().build_script(&[], Some(Path::new(".auth/password-0.json")));
        assert!(script.contains(r#"storageState: ".auth/password-0.json""#));
    }

    #[test]
    fn chromium_contexts_get_clipboard_permissions() {
        let script = driver().build_script(&[], None);
        assert!(script.contains("permissions: ['clipboard-read', 'clipboard-write']"));

        let firefox = BrowserDriver {
            config: BrowserConfig {
                browser: Browser::Firefox,
                ..BrowserConfig::default()
            },
        };
        assert!(!firefox.build_script(&[], None).contains("clipboard-read"));
    }

    #[test]
    fn values_are_escaped_as_js_strings() {
        let script = driver().build_script(
            &[TestStep::FillLabel {
                label: "Email Address".into(),
                value: "o'brien\"@example.com".into(),
            }],
            None,
        );
        assert!(script.contains(r#"getByLabel("Email Address").fill("o'brien\"@example.com")"#));
    }

    #[test]
    fn exact_text_is_anchored_and_regex_escaped() {
        let script = driver().build_script(
            &[TestStep::ExpectText {
                text: "Invalid credentials provided.".into(),
                exact: true,
            }],
            None,
        );
        // The backslash is itself escaped inside the JS string literal.
        assert!(script.contains(r"^Invalid credentials provided\\.$"));
        assert!(script.contains("locator('div').filter"));
    }

    #[test]
    fn captcha_wait_targets_the_turnstile_widget() {
        let script = driver().build_script(&[TestStep::WaitForCaptcha], None);
        assert!(script.contains("aside#cf-turnstile"));
        assert!(script.contains("networkidle"));
    }
}
