//! Node.js side of the Playwright bridge.

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::LaunchOptions;

pub(crate) const REPLY_MARKER: &str = "__AUTOLOGIN_BRIDGE__=";

/// Id of the unsolicited reply the runner emits once the page is open.
pub(crate) const READY_ID: u64 = 0;

#[derive(Debug, Deserialize)]
pub(crate) struct BridgeReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub value: Value,
}

/// Parse one stdout line; lines without the marker are page/runtime noise.
pub(crate) fn parse_reply_line(line: &str) -> Option<BridgeReply> {
    let rest = line.strip_prefix(REPLY_MARKER)?;
    serde_json::from_str(rest.trim()).ok()
}

pub(crate) fn build_bridge_runner(options: &LaunchOptions) -> Result<String> {
    let options_literal = serde_json::to_string(options)?;

    let mut script = String::new();
    script.push_str("import { createRequire } from 'node:module';\n");
    script.push_str("import path from 'node:path';\n");
    script.push_str("import readline from 'node:readline';\n\n");
    script.push_str(&format!("const REPLY_MARKER = '{}';\n", REPLY_MARKER));
    script.push_str(&format!("const options = {};\n", options_literal));
    script.push_str("const reply = (id, ok, value) => {\n");
    script.push_str("  process.stdout.write(`${REPLY_MARKER}${JSON.stringify({ id, ok, value: value ?? null })}\\n`);\n");
    script.push_str("};\n\n");

    script.push_str("let chromium;\n");
    script.push_str("try {\n");
    // Resolve from the working directory, not from the temp dir holding this file.
    script.push_str(
        "  ({ chromium } = createRequire(path.join(process.cwd(), 'bridge.cjs'))('playwright'));\n",
    );
    script.push_str("} catch (error) {\n");
    script.push_str(&format!(
        "  reply({}, false, error && error.message ? error.message : String(error));\n",
        READY_ID
    ));
    script.push_str("  process.exit(1);\n");
    script.push_str("}\n\n");

    script.push_str("const browser = await chromium.launch({ headless: options.headless, args: options.args });\n");
    script.push_str("const context = await browser.newContext({ viewport: options.viewport, userAgent: options.userAgent });\n");
    script.push_str("const page = await context.newPage();\n\n");

    script.push_str("async function firstVisible(selectors, timeout) {\n");
    script.push_str("  for (const selector of selectors) {\n");
    script.push_str("    try {\n");
    script.push_str("      await page.locator(selector).first().waitFor({ state: 'visible', timeout });\n");
    script.push_str("      return selector;\n");
    script.push_str("    } catch (_) {}\n");
    script.push_str("  }\n");
    script.push_str("  return null;\n");
    script.push_str("}\n\n");

    script.push_str("async function execute(command) {\n");
    script.push_str("  const timeout = command.timeout_ms ?? 10000;\n");
    script.push_str("  switch (command.op) {\n");
    script.push_str("    case 'navigate':\n");
    script.push_str("      await page.goto(command.url, { timeout });\n");
    script.push_str("      return null;\n");
    script.push_str("    case 'current_url':\n");
    script.push_str("      return page.url();\n");
    script.push_str("    case 'wait_for_load_state':\n");
    script.push_str("      await page.waitForLoadState(command.state, { timeout });\n");
    script.push_str("      return null;\n");
    script.push_str("    case 'find_first_visible':\n");
    script.push_str("      return await firstVisible(command.selectors, timeout);\n");
    script.push_str("    case 'click':\n");
    script.push_str("      await page.locator(command.selector).first().click({ timeout });\n");
    script.push_str("      return null;\n");
    script.push_str("    case 'fill':\n");
    script.push_str("      await page.locator(command.selector).first().fill(command.value, { timeout });\n");
    script.push_str("      return null;\n");
    script.push_str("    case 'inner_text':\n");
    script.push_str("      return await page.locator(command.selector).first().innerText({ timeout });\n");
    script.push_str("    case 'press':\n");
    script.push_str("      await page.keyboard.press(command.key);\n");
    script.push_str("      return null;\n");
    script.push_str("    case 'screenshot':\n");
    script.push_str("      await page.screenshot({ path: command.path, timeout });\n");
    script.push_str("      return command.path;\n");
    script.push_str("    case 'reload':\n");
    script.push_str("      await page.reload({ timeout });\n");
    script.push_str("      return null;\n");
    script.push_str("    case 'add_cookies':\n");
    script.push_str("      await context.addCookies(command.cookies);\n");
    script.push_str("      return null;\n");
    script.push_str("    case 'cookies':\n");
    script.push_str("      return await context.cookies();\n");
    script.push_str("    case 'close':\n");
    script.push_str("      return null;\n");
    script.push_str("    default:\n");
    script.push_str("      throw new Error(`Unsupported command: ${command.op}`);\n");
    script.push_str("  }\n");
    script.push_str("}\n\n");

    script.push_str(&format!("reply({}, true, 'ready');\n\n", READY_ID));

    script.push_str("const input = readline.createInterface({ input: process.stdin });\n");
    script.push_str("for await (const line of input) {\n");
    script.push_str("  let command;\n");
    script.push_str("  try {\n");
    script.push_str("    command = JSON.parse(line);\n");
    script.push_str("  } catch (_) {\n");
    script.push_str("    continue;\n");
    script.push_str("  }\n");
    script.push_str("  try {\n");
    script.push_str("    reply(command.id, true, await execute(command));\n");
    script.push_str("  } catch (error) {\n");
    script.push_str("    reply(command.id, false, error && error.message ? error.message : String(error));\n");
    script.push_str("  }\n");
    script.push_str("  if (command.op === 'close') {\n");
    script.push_str("    break;\n");
    script.push_str("  }\n");
    script.push_str("}\n\n");

    script.push_str("await context.close().catch(() => {});\n");
    script.push_str("await browser.close().catch(() => {});\n");
    script.push_str("process.exit(0);\n");

    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_embeds_launch_options_and_commands() {
        let script = build_bridge_runner(&LaunchOptions::default()).unwrap();
        assert!(script.contains("\"headless\":true"));
        assert!(script.contains("\"userAgent\":"));
        assert!(script.contains("case 'find_first_visible'"));
        assert!(script.contains("case 'add_cookies'"));
        assert!(script.contains("reply(0, true, 'ready')"));
    }

    #[test]
    fn parse_reply_line_requires_marker() {
        assert!(parse_reply_line("{\"id\":1,\"ok\":true}").is_none());
        assert!(parse_reply_line("console noise").is_none());

        let reply = parse_reply_line("__AUTOLOGIN_BRIDGE__={\"id\":4,\"ok\":false,\"value\":\"boom\"}")
            .unwrap();
        assert_eq!(reply.id, 4);
        assert!(!reply.ok);
        assert_eq!(reply.value, "boom");
    }

    #[test]
    fn parse_reply_line_defaults_missing_value() {
        let reply = parse_reply_line("__AUTOLOGIN_BRIDGE__={\"id\":2,\"ok\":true}").unwrap();
        assert!(reply.value.is_null());
    }
}
