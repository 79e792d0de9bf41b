use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use parley_core::format::{DisplayNode, FormatterEngine, NodeKind};
use parley_core::media::MediaHints;
use parley_core::telemetry;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_RESPONSE: &str = "### Key Points\n\n\
1. **useEffect** runs after every render\n\
2. *Dependency array* controls when the effect runs\n\
3. Return a cleanup function to avoid leaks\n\n\
#### Best Practices\n\n\
• Use `useRef` for values that persist across renders\n\
• Keep effects focused on one concern\n\n\
```js\nuseEffect(() => {\n  document.title = `Clicked ${count} times`;\n}, [count]);\n```";

const DEMO_IMAGE: &str = r#"{"image_base64":"iVBORw0KGgo=","seed":"1234","finish_reason":"SUCCESS"}"#;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Parley")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the formatter over canned responses and check their shape.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

#[derive(Debug, Default)]
struct Counts {
    headings: usize,
    list_items: usize,
    code_blocks: usize,
    inline: usize,
}

fn count(nodes: &[DisplayNode], counts: &mut Counts) {
    for node in nodes {
        match &node.kind {
            NodeKind::Heading { .. } => counts.headings += 1,
            NodeKind::ListItem { .. } => counts.list_items += 1,
            NodeKind::CodeBlock { .. } => counts.code_blocks += 1,
            NodeKind::InlineCode { .. } | NodeKind::Bold { .. } | NodeKind::Italic { .. } => {
                counts.inline += 1
            }
            _ => {}
        }
        count(node.children(), counts);
    }
}

fn smoke_test() -> Result<()> {
    let engine = FormatterEngine::new(MediaHints::default());

    let nodes = engine.format(DEMO_RESPONSE, Some("gpt-4o"));
    if nodes != engine.format(DEMO_RESPONSE, Some("gpt-4o")) {
        bail!("formatter output is not stable across runs");
    }
    let mut counts = Counts::default();
    count(&nodes, &mut counts);
    info!(
        "nodes" = nodes.len(),
        "headings" = counts.headings,
        "list_items" = counts.list_items,
        "code_blocks" = counts.code_blocks,
        "inline" = counts.inline,
        "demo response formatted"
    );
    if counts.headings != 2 || counts.list_items != 5 || counts.code_blocks != 1 {
        bail!("unexpected demo shape: {counts:?}");
    }

    let media = engine.format(DEMO_IMAGE, Some("stability"));
    match media.as_slice() {
        [node] if matches!(node.kind, NodeKind::Media(_)) => {
            info!("image response decoded");
        }
        other => bail!("image response produced {} nodes", other.len()),
    }

    Ok(())
}
