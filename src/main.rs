use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, ensure, Context, Result};
use by_address::ByAddress;
use clap::{ArgAction, Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slot_tree::codec::payload::{External, OwnerCollection};
use slot_tree::document::Document;
use slot_tree::{NodeIndex, Removal, SlotTree};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Ron,
}

#[derive(Parser, Debug)]
#[command(
    name = "slot-tree-demo",
    about = "Build a slot tree, print it, and round-trip it through a document."
)]
struct Cli {
    /// Load a saved tree of numeric payloads instead of building the demo tree.
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,
    /// Write the encoded document here instead of stdout.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Document rendering.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
    /// Also show the tree with payloads stored in an owner collection.
    #[arg(long, action = ArgAction::SetTrue)]
    external: bool,
    /// Log every tree operation.
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "slot_tree=trace" } else { "slot_tree=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let tree = match &cli.input {
        Some(path) => load(path, cli.format)?,
        None => demo_tree()?,
    };
    print!("{}", tree.debug_draw(|p| p.to_string()));

    let document = tree.to_document();
    let rendered = render(&document, cli.format)?;
    match &cli.output {
        Some(path) => {
            fs::write(path, &rendered).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "saved tree");
        }
        None => println!("{rendered}"),
    }

    let reloaded = SlotTree::<i64>::from_document(&parse(&rendered, cli.format)?)
        .context("decoding the rendered document")?;
    ensure!(reloaded == tree, "reloaded tree differs from the original");
    reloaded.validate().context("reloaded tree is inconsistent")?;
    info!(nodes = reloaded.len(), free = reloaded.free_list().len(), "round trip ok");

    if cli.external {
        external_demo()?;
    }
    Ok(())
}

/// Builds 0 -> {1, 2}, 2 -> {3 -> 4, 5}, then removes 3, refills a slot,
/// and rebases the tree onto a new root.
fn demo_tree() -> Result<SlotTree<i64>> {
    let mut tree = SlotTree::new();
    let n0 = tree.add_node(0, None)?;
    tree.add_node(1, Some(n0))?;
    let n2 = tree.add_node(2, Some(n0))?;
    let n3 = tree.add_node(3, Some(n2))?;
    tree.add_node(4, Some(n3))?;
    let n5 = tree.add_node(5, Some(n2))?;
    print!("{}", tree.debug_draw(|p| p.to_string()));

    tree.remove_node(n3, Removal::Recursive)?;
    print!("{}", tree.debug_draw(|p| p.to_string()));

    tree.add_node(3, Some(n5))?;
    let n6 = tree.add_node(6, None)?;
    tree.add_node(4, Some(n6))?;
    Ok(tree)
}

fn load(path: &Path, format: Format) -> Result<SlotTree<i64>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let tree = SlotTree::from_document(&parse(&text, format)?)
        .with_context(|| format!("decoding {}", path.display()))?;
    info!(path = %path.display(), nodes = tree.len(), "loaded tree");
    Ok(tree)
}

fn render(document: &Document, format: Format) -> Result<String> {
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(document)?,
        Format::Ron => ron::ser::to_string_pretty(document, ron::ser::PrettyConfig::default())?,
    })
}

fn parse(text: &str, format: Format) -> Result<Document> {
    let document = match format {
        Format::Json => serde_json::from_str(text)?,
        Format::Ron => ron::from_str(text)?,
    };
    Ok(document)
}

/// Stores payloads as positions into a vector of shared strings.
fn external_demo() -> Result<()> {
    let mut owner: Vec<ByAddress<Rc<String>>> = Vec::new();
    let mut handles = Vec::new();
    for name in ["beta", "alpha", "gamma"] {
        let handle = ByAddress(Rc::new(name.to_owned()));
        OwnerCollection::append(&mut owner, handle.clone());
        handles.push(handle);
    }

    let mut tree = SlotTree::new();
    let root = tree.add_node(handles[1].clone(), None)?;
    for handle in [&handles[0], &handles[2]] {
        tree.add_node(handle.clone(), Some(root))?;
    }
    print!("{}", tree.debug_draw(|h| h.as_str().to_owned()));

    let document = tree.encode(&External(&owner))?;
    println!("{}", serde_json::to_string_pretty(&document)?);

    let back = SlotTree::<ByAddress<Rc<String>>>::decode(&document, &External(&owner))?;
    let same_objects = back
        .iter_live()
        .all(|(i, item)| Rc::ptr_eq(&item.0, &tree[i].0));
    if !same_objects {
        bail!("decoded payloads are not the owner's objects");
    }
    ensure!(
        back.top_node() == Some(NodeIndex(0)),
        "decoded root moved to {:?}",
        back.top_node()
    );
    Ok(())
}
