use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};

use clap::{Args, Parser as ClapParser, Subcommand};
use readql::{
    CompileOptions,
    cli::{self, CheckOptions, CheckResult, CliError, FilterOptions},
};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "readql")]
#[command(about = "Readql - A query language for filtering sequencing reads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that compiles a query.
#[derive(Args)]
struct QueryArgs {
    /// The readql query
    query: String,

    /// Make NAME usable as a predicate (NAME=QUERY, repeatable)
    #[arg(short = 'D', long = "define", value_name = "NAME=QUERY")]
    defines: Vec<String>,
}

impl QueryArgs {
    fn defines(&self) -> Result<Vec<(String, String)>, CliError> {
        self.defines.iter().map(|d| cli::parse_define(d)).collect()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and type-check a query, printing its canonical form
    Check {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print the IR of the filter and index functions
    Emit {
        #[command(flatten)]
        query: QueryArgs,

        /// Name of the filter function
        #[arg(short, long, default_value = "filter")]
        name: String,

        /// Restrict the query to the intervals of a BED file
        #[arg(long)]
        bed: Option<PathBuf>,
    },

    /// Run a query over a JSON document of records
    Filter {
        #[command(flatten)]
        query: QueryArgs,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Read the JSON input from a file
        #[arg(short = 'f', long, conflicts_with = "input")]
        file: Option<PathBuf>,

        /// Restrict the query to the intervals of a BED file
        #[arg(long)]
        bed: Option<PathBuf>,

        /// Skip references the query cannot match
        #[arg(long)]
        index: bool,

        /// Print the records the query rejects instead
        #[arg(short, long)]
        reject: bool,

        /// Print the summary as JSON on stderr
        #[arg(long)]
        summary: bool,
    },

    /// List documentation categories
    Docs,

    /// Show documentation for a specific category
    Doc {
        /// Category name (use 'readql docs' to list categories)
        category: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { query } => run_check(query),
        Commands::Emit { query, name, bed } => run_emit(query, name, bed),
        Commands::Filter {
            query,
            input,
            file,
            bed,
            index,
            reject,
            summary,
        } => run_filter(query, input, file, bed, index, reject, summary),
        Commands::Docs => {
            print!("{}", cli::get_docs_overview());
            Ok(())
        }
        Commands::Doc { category } => match cli::get_doc_category(&category) {
            Ok(content) => {
                print!("{}", content);
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_check(query: QueryArgs) -> Result<(), CliError> {
    let options = CheckOptions {
        defines: query.defines()?,
        query: query.query,
    };

    match cli::execute_check(&options)? {
        CheckResult::Valid {
            canonical,
            uses_index,
        } => {
            println!("valid (index: {})", if uses_index { "yes" } else { "no" });
            println!("{}", canonical);
        }
        CheckResult::Invalid(report) => {
            eprint!("{}", report);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn run_emit(query: QueryArgs, name: String, bed: Option<PathBuf>) -> Result<(), CliError> {
    let options = CompileOptions {
        name,
        defines: query.defines()?,
        bed,
    };
    print!("{}", cli::execute_emit(&query.query, &options)?);
    Ok(())
}

fn run_filter(
    query: QueryArgs,
    input: Option<String>,
    file: Option<PathBuf>,
    bed: Option<PathBuf>,
    index: bool,
    reject: bool,
    summary: bool,
) -> Result<(), CliError> {
    let input = match (input, file) {
        (Some(s), _) => s,
        (None, Some(path)) => fs::read_to_string(path)?,
        (None, None) if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(CliError::Io)?;
            buffer
        }
        (None, None) => return Err(CliError::NoInput),
    };

    // Definitions are checked up front so that a parse error below is the query's.
    let defines = query.defines()?;
    readql::parser::define_scope(&defines)?;

    let options = FilterOptions {
        compile: CompileOptions {
            defines,
            bed,
            ..CompileOptions::default()
        },
        query: query.query,
        input,
        use_index: index,
        reject,
    };

    let output = match cli::execute_filter(&options) {
        Err(CliError::Parse(e)) => {
            eprint!("{}", readql::parser::render_error(&options.query, &e));
            std::process::exit(1);
        }
        other => other?,
    };
    for message in &output.errors {
        eprintln!("warning: {}", message);
    }
    for name in &output.names {
        println!("{}", name);
    }
    if summary {
        eprintln!("{}", serde_json::to_string(&output.summary)?);
    }
    Ok(())
}
