use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use expense_tracker::config::{ClientConfig, API_URL_ENV};
use expense_tracker::expenses::{Category, ExpenseForm, ExpenseManager};
use expense_tracker::session::{signup, SessionStore, SignupForm};
use expense_tracker::storage::FileStore;
use expense_tracker::structured_logger::StructuredLogger;
use expense_tracker::{grand_total, newest_first, paths, ApiClient, ClientError};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("EXPENSE_TRACKER_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "expenses")]
#[command(about = "Track personal expenses against the expense tracker backend")]
#[command(version = VERSION)]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long, env = API_URL_ENV, global = true)]
    api_url: Option<String>,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account (does not log in)
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(long, env = "EXPENSE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Log in with a username or email address
    Login {
        identifier: String,
        /// Read from stdin when omitted
        #[arg(long, env = "EXPENSE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the current session
    Whoami {
        /// Re-fetch the user record from the backend
        #[arg(long)]
        refresh: bool,
    },
    /// List expenses, newest first
    List,
    /// Add an expense
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value_t = Category::Food)]
        category: Category,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Replace fields of an existing expense
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete an expense
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Per-category totals
    Summary,
}

struct Client {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    manager: ExpenseManager,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_client(cli: &Cli) -> Result<Client> {
    let mut config = ClientConfig::resolve().context("Failed to load configuration")?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_base_url(url.as_str())?;
    }
    tracing::debug!(api_base_url = %config.api_base_url, "configuration resolved");

    let logger = Arc::new(StructuredLogger::new(&paths::logs_dir()?)?);
    let storage = Arc::new(FileStore::open_default()?);
    let session = Arc::new(SessionStore::rehydrate(storage)?.with_logger(logger.clone()));
    let api = Arc::new(ApiClient::from_config(&config));
    let manager = ExpenseManager::new(api.clone(), session.clone(), config.failure_policy.clone())
        .with_logger(logger);

    Ok(Client {
        api,
        session,
        manager,
    })
}

fn read_password(given: Option<String>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn ask(prompt: &str) -> bool {
    eprint!("{} [y/N] ", prompt);
    if std::io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn run(cli: Cli) -> Result<()> {
    let client = build_client(&cli)?;

    match cli.command {
        Commands::Signup {
            username,
            email,
            password,
        } => {
            let form = SignupForm {
                username,
                email,
                password: read_password(password)?,
            };
            let user = signup(&client.api, &form).await?;
            println!("Account created for {}. You can log in now.", user.username);
        }
        Commands::Login {
            identifier,
            password,
        } => {
            let password = read_password(password)?;
            let user = client
                .session
                .login(&client.api, &identifier, &password)
                .await?;
            println!("Logged in as {} <{}>", user.username, user.email);
        }
        Commands::Logout => {
            client.session.logout()?;
            client.manager.clear();
            println!("Logged out.");
        }
        Commands::Whoami { refresh } => {
            if refresh {
                client.session.refresh_user(&client.api).await?;
            }
            print_session(&client.session);
        }
        Commands::List => {
            let expenses = client.manager.list().await?;
            if expenses.is_empty() {
                println!("No expenses yet.");
            }
            for expense in newest_first(&expenses) {
                println!(
                    "{:<26} {:<10} {:<10} {:>10.2}  {}",
                    expense.id, expense.date, expense.category, expense.amount, expense.title
                );
            }
        }
        Commands::Add {
            title,
            amount,
            category,
            date,
        } => {
            let mut form = ExpenseForm {
                title,
                amount,
                category,
                date: date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string()),
            };
            client
                .manager
                .create(&mut form, |expense| {
                    println!("Added {} ({:.2}) as {}", expense.title, expense.amount, expense.id);
                })
                .await?;
        }
        Commands::Edit {
            id,
            title,
            amount,
            category,
            date,
        } => {
            let expenses = client.manager.list().await?;
            let existing = expenses
                .iter()
                .find(|e| e.id == id)
                .with_context(|| format!("No expense with id '{}'", id))?;

            let mut form = client.manager.begin_edit(existing);
            if let Some(title) = title {
                form.title = title;
            }
            if let Some(amount) = amount {
                form.amount = amount;
            }
            if let Some(category) = category {
                form.category = category;
            }
            if let Some(date) = date {
                form.date = date;
            }

            let updated = client.manager.update(&id, &form).await?;
            println!("Updated {} ({:.2})", updated.title, updated.amount);
        }
        Commands::Delete { id, yes } => {
            let confirm = |prompt: &str| yes || ask(prompt);
            if client.manager.delete(&id, &confirm).await? {
                println!("Deleted {}.", id);
            } else {
                println!("Kept {}.", id);
            }
        }
        Commands::Summary => {
            let expenses = client.manager.list().await?;
            for total in client.manager.totals() {
                println!("{:<10} {:>10.2}", total.category, total.total);
            }
            println!("{:<10} {:>10.2}", "Total", grand_total(&expenses));
        }
    }

    Ok(())
}

fn print_session(session: &SessionStore) {
    let snapshot = session.subscribe().borrow().clone();
    println!("Session: {:?}", snapshot.phase);
    if let Some(identifier) = snapshot.identifier {
        println!("Login:   {}", identifier);
    }
    if let Some(user) = session.user() {
        println!("User:    {} <{}>", user.username, user.email);
        if let Some(id) = user.normalized_id() {
            println!("User ID: {}", id);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ClientError>() {
                Some(client_err) => eprintln!("{}", client_err.user_message()),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
