//! xmlq -- parse XML files, run XPath queries, print markup or C14N.
//!
//! Log output goes to stderr and is controlled with `RUST_LOG`
//! (for example `RUST_LOG=oxidom=debug`).

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use oxidom::dom::{Document, DomNode, XPathContext, XPathObjectType};
use oxidom::ParseOptions;

const EXIT_SUCCESS: u8 = 0;
const EXIT_PARSE_ERROR: u8 = 1;
const EXIT_XPATH_ERROR: u8 = 2;
const EXIT_OUTPUT_ERROR: u8 = 3;

/// Parse XML files and print them, their canonical form, or XPath results.
#[derive(Parser, Debug)]
#[command(name = "xmlq", version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// XML files to process (use `-` for stdin).
    #[arg(required = true)]
    files: Vec<String>,

    /// Print parser diagnostics.
    #[arg(long)]
    verbose: bool,

    // -- Parsing options ---------------------------------------------------
    /// Recover from well-formedness errors (produce a partial tree).
    #[arg(long)]
    recover: bool,

    /// Substitute entity references with their replacement text.
    #[arg(long)]
    noent: bool,

    /// Remove whitespace-only text in element content.
    #[arg(long)]
    noblanks: bool,

    /// Merge CDATA sections into text.
    #[arg(long)]
    nocdata: bool,

    /// Drop redundant namespace declarations.
    #[arg(long)]
    nsclean: bool,

    /// Apply default attribute values from the internal subset.
    #[arg(long)]
    dtdattr: bool,

    /// Lift parser size limits.
    #[arg(long)]
    huge: bool,

    /// Report pedantic warnings.
    #[arg(long)]
    pedantic: bool,

    // -- Output ------------------------------------------------------------
    /// Indent the output.
    #[arg(long)]
    format: bool,

    /// Print Canonical XML 1.0 instead of markup.
    #[arg(long)]
    c14n: bool,

    /// Keep comments in canonical output.
    #[arg(long, requires = "c14n")]
    with_comments: bool,

    // -- XPath -------------------------------------------------------------
    /// Evaluate an XPath expression and print the result.
    #[arg(long, value_name = "EXPR")]
    xpath: Option<String>,

    /// Bind a namespace prefix for --xpath, as PREFIX=URI.
    #[arg(long = "ns", value_name = "PREFIX=URI", requires = "xpath")]
    namespaces: Vec<String>,

    /// Print literal node values instead of markup for node-set results.
    #[arg(long, requires = "xpath")]
    literal: bool,
}

impl Cli {
    fn parse_options(&self) -> ParseOptions {
        let mut options = ParseOptions::default();
        options.set(ParseOptions::RECOVER, self.recover);
        options.set(ParseOptions::NO_ENT, self.noent);
        options.set(ParseOptions::NO_BLANKS, self.noblanks);
        options.set(ParseOptions::NO_CDATA, self.nocdata);
        options.set(ParseOptions::NS_CLEAN, self.nsclean);
        options.set(ParseOptions::DTD_ATTR, self.dtdattr);
        options.set(ParseOptions::HUGE, self.huge);
        options.set(ParseOptions::PEDANTIC, self.pedantic);
        options
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut worst_exit = EXIT_SUCCESS;
    for file in &cli.files {
        worst_exit = worst_exit.max(process_file(&cli, file));
    }
    ExitCode::from(worst_exit)
}

fn process_file(cli: &Cli, filename: &str) -> u8 {
    let input = match read_input(filename) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("{filename}: failed to read: {e}");
            return EXIT_PARSE_ERROR;
        }
    };

    let doc = match Document::parse_bytes_with_options(&input, cli.parse_options()) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{filename}: {e}");
            return EXIT_PARSE_ERROR;
        }
    };

    if cli.verbose {
        if let Ok(diagnostics) = doc.diagnostics() {
            for diag in diagnostics {
                eprintln!("{filename}: {diag}");
            }
        }
    }

    let output = match &cli.xpath {
        Some(expr) => match evaluate_xpath(cli, &doc, expr) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("{filename}: {e}");
                return EXIT_XPATH_ERROR;
            }
        },
        None if cli.c14n => match doc.to_c14n(cli.with_comments) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("{filename}: {e}");
                return EXIT_OUTPUT_ERROR;
            }
        },
        None => match doc.to_xml_formatted(0, cli.format) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("{filename}: {e}");
                return EXIT_OUTPUT_ERROR;
            }
        },
    };

    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout.write_all(output.as_bytes()) {
        eprintln!("{filename}: failed to write output: {e}");
        return EXIT_OUTPUT_ERROR;
    }
    EXIT_SUCCESS
}

fn evaluate_xpath(cli: &Cli, doc: &Document, expr: &str) -> oxidom::Result<String> {
    let mut ctx = XPathContext::new(doc)?;
    for binding in &cli.namespaces {
        let (prefix, uri) = binding
            .split_once('=')
            .ok_or_else(|| oxidom::DomError::InvalidArgument(format!("expected PREFIX=URI, got '{binding}'")))?;
        ctx.register_ns(prefix, uri)?;
    }
    let result = ctx.evaluate(expr)?;
    if result.object_type() != XPathObjectType::NodeSet {
        return Ok(format!("{}\n", result.string_value()?));
    }
    let mut out = String::new();
    for node in result.node_list()? {
        if cli.literal {
            out.push_str(&node.literal()?);
        } else {
            out.push_str(&node.to_xml_formatted(0, cli.format)?);
        }
        out.push('\n');
    }
    Ok(out)
}

fn read_input(filename: &str) -> io::Result<Vec<u8>> {
    if filename == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(filename)
    }
}
