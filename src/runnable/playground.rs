//! Browser playground for a runnable.
//!
//! The page only uses relative URLs (`../stream`), so it keeps working when
//! a reverse proxy serves the app under a path prefix.

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{name}} playground</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
  #log { border: 1px solid #ccc; border-radius: 6px; padding: 1rem; min-height: 16rem; white-space: pre-wrap; }
  .user { color: #555; margin-top: .75rem; }
  .assistant { margin-top: .25rem; }
  .error { color: #b00020; }
  form { display: flex; gap: .5rem; margin-top: 1rem; }
  input { flex: 1; padding: .5rem; }
</style>
</head>
<body>
<h1>{{name}}</h1>
<div id="log"></div>
<form id="ask">
  <input id="question" autocomplete="off" placeholder="Ask a question">
  <button type="submit">Send</button>
</form>
<script>
const history = [];
const log = document.getElementById("log");

function line(cls, text) {
  const div = document.createElement("div");
  div.className = cls;
  div.textContent = text;
  log.appendChild(div);
  return div;
}

document.getElementById("ask").addEventListener("submit", async (event) => {
  event.preventDefault();
  const field = document.getElementById("question");
  const question = field.value.trim();
  if (!question) return;
  field.value = "";
  line("user", "You: " + question);
  const answer = line("assistant", "");

  const response = await fetch("../stream", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ input: { question, chat_history: history } }),
  });
  if (!response.ok) {
    const body = await response.json().catch(() => ({}));
    answer.className = "error";
    answer.textContent = body.detail || response.statusText;
    return;
  }

  const reader = response.body.getReader();
  const decoder = new TextDecoder();
  let buffer = "";
  for (;;) {
    const { value, done } = await reader.read();
    if (done) break;
    buffer += decoder.decode(value, { stream: true });
    let split;
    while ((split = buffer.indexOf("\n\n")) >= 0) {
      const frame = buffer.slice(0, split);
      buffer = buffer.slice(split + 2);
      const kind = (frame.match(/^event: ?(.*)$/m) || [])[1];
      const data = (frame.match(/^data: ?(.*)$/m) || [])[1];
      if (kind === "data") answer.textContent += JSON.parse(data);
      if (kind === "error") {
        answer.className = "error";
        answer.textContent = JSON.parse(data).message;
      }
    }
  }
  history.push({ role: "user", content: question });
  history.push({ role: "assistant", content: answer.textContent });
});
</script>
</body>
</html>
"#;

/// Render the playground page for the runnable called `name`.
pub(super) fn render(name: &str) -> String {
    TEMPLATE.replace("{{name}}", &escape_html(name))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
