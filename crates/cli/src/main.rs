use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use data_model::DataModel;
use data_model::parser::parse_ratings;
use recommenders::{Aggregation, MetricKind, ModelConfig, Recommender, RecommenderConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Seed of the train/test split when `--seed` is not given
const DEFAULT_SPLIT_SEED: u64 = 42;

/// cfrec - collaborative filtering recommenders
#[derive(Parser)]
#[command(name = "cfrec")]
#[command(
    about = "Train neighborhood and factorization recommenders on rating files",
    long_about = None
)]
struct Cli {
    /// Ratings file, one `user<sep>item<sep>rating` per line
    #[arg(short, long, default_value = "data/ml-1m/ratings.dat")]
    ratings: PathBuf,

    /// Field separator of the rating files
    #[arg(long, default_value = "::")]
    separator: String,

    /// Held-out ratings file forming the test pools
    #[arg(long)]
    test_ratings: Option<PathBuf>,

    /// Hold out this fraction of the ratings as the test pools
    #[arg(long)]
    test_fraction: Option<f64>,

    /// Seed for the split and for NMF initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads for training sweeps
    #[arg(long)]
    threads: Option<usize>,

    /// JSON recommender configuration; overrides the model flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recommender engine
    #[arg(long, value_enum, default_value_t = ModelArg::ItemKnn)]
    model: ModelArg,

    /// Number of neighbors (ItemKNN / UserKNN)
    #[arg(short, default_value = "20")]
    k: usize,

    /// Similarity metric (ItemKNN / UserKNN)
    #[arg(long, value_enum, default_value_t = MetricArg::Pearson)]
    metric: MetricArg,

    /// Median of the rating scale, required by correlation-constrained
    #[arg(long)]
    median: Option<f64>,

    /// How neighbor ratings are combined (ItemKNN / UserKNN)
    #[arg(long, value_enum, default_value_t = AggregationArg::WeightedMean)]
    aggregation: AggregationArg,

    /// Number of latent factors (NMF)
    #[arg(long, default_value = "10")]
    factors: usize,

    /// Number of iterations (NMF)
    #[arg(long, default_value = "50")]
    iters: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the size and shape of the rating data
    Stats,

    /// Train the configured recommender and report timing
    Fit,

    /// Predict the rating of one user for one item
    Predict {
        /// User code
        #[arg(long)]
        user: String,

        /// Item code
        #[arg(long)]
        item: String,
    },

    /// Rank the items a user has not rated yet
    Recommend {
        /// User code
        #[arg(long)]
        user: String,

        /// Number of recommendations to return
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    ItemKnn,
    UserKnn,
    Nmf,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    Pearson,
    CorrelationConstrained,
    Cosine,
    AdjustedCosine,
    MeanSquaredDifference,
    Jaccard,
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregationArg {
    Mean,
    WeightedMean,
    DeviationFromMean,
    WeightedDeviationFromMean,
}

impl From<AggregationArg> for Aggregation {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::Mean => Aggregation::Mean,
            AggregationArg::WeightedMean => Aggregation::WeightedMean,
            AggregationArg::DeviationFromMean => Aggregation::DeviationFromMean,
            AggregationArg::WeightedDeviationFromMean => Aggregation::WeightedDeviationFromMean,
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!("Loading ratings from {}...", cli.ratings.display());
    let start = Instant::now();
    let model = Arc::new(load_model(&cli).context("Failed to load ratings")?);
    println!(
        "{} Loaded {} ratings in {:?}",
        "✓".green(),
        model.number_of_ratings(),
        start.elapsed()
    );

    match &cli.command {
        Commands::Stats => handle_stats(&model),
        Commands::Fit => handle_fit(&cli, model).map(|_| ()),
        Commands::Predict { user, item } => handle_predict(&cli, model, user, item),
        Commands::Recommend { user, limit } => handle_recommend(&cli, model, user, *limit),
    }
}

/// Build the DataModel from the rating files and split options
fn load_model(cli: &Cli) -> Result<DataModel> {
    let ratings = parse_ratings(&cli.ratings, &cli.separator)?;
    let mut builder = DataModel::builder().ratings(ratings);

    if let Some(path) = &cli.test_ratings {
        let held_out = parse_ratings(path, &cli.separator)
            .with_context(|| format!("Failed to read test ratings {}", path.display()))?;
        builder = builder.held_out(held_out);
    }
    if let Some(fraction) = cli.test_fraction {
        builder = builder.split(fraction, cli.seed.unwrap_or(DEFAULT_SPLIT_SEED));
    }

    Ok(builder.build()?)
}

/// Recommender configuration from `--config` or from the model flags
fn resolve_config(cli: &Cli) -> Result<RecommenderConfig> {
    let mut config = match &cli.config {
        Some(path) => RecommenderConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => RecommenderConfig::new(model_from_flags(cli)?),
    };
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }
    config.validate()?;
    Ok(config)
}

fn model_from_flags(cli: &Cli) -> Result<ModelConfig> {
    let aggregation = Aggregation::from(cli.aggregation);
    Ok(match cli.model {
        ModelArg::ItemKnn => ModelConfig::ItemKnn {
            k: cli.k,
            metric: metric_from_flags(cli)?,
            aggregation,
        },
        ModelArg::UserKnn => ModelConfig::UserKnn {
            k: cli.k,
            metric: metric_from_flags(cli)?,
            aggregation,
        },
        ModelArg::Nmf => ModelConfig::Nmf {
            num_factors: cli.factors,
            num_iters: cli.iters,
            seed: cli.seed,
        },
    })
}

fn metric_from_flags(cli: &Cli) -> Result<MetricKind> {
    Ok(match cli.metric {
        MetricArg::Pearson => MetricKind::Pearson,
        MetricArg::CorrelationConstrained => {
            let median = cli.median.ok_or_else(|| {
                anyhow!("--median is required with --metric correlation-constrained")
            })?;
            MetricKind::CorrelationConstrained { median }
        }
        MetricArg::Cosine => MetricKind::Cosine,
        MetricArg::AdjustedCosine => MetricKind::AdjustedCosine,
        MetricArg::MeanSquaredDifference => MetricKind::MeanSquaredDifference,
        MetricArg::Jaccard => MetricKind::Jaccard,
    })
}

/// Handle the 'stats' command
fn handle_stats(model: &DataModel) -> Result<()> {
    let (users, items, ratings) = model.counts();
    let density = if users == 0 || items == 0 {
        0.0
    } else {
        ratings as f64 / (users as f64 * items as f64)
    };

    println!("{}", "Rating data:".bold().blue());
    println!("{}Users: {}", "• ".green(), users);
    println!("{}Items: {}", "• ".green(), items);
    println!("{}Ratings: {}", "• ".green(), ratings);
    println!("{}Density: {:.4}%", "• ".green(), density * 100.0);
    println!("{}Mean rating: {:.3}", "• ".green(), model.global_mean());

    println!("{}", "Test pools:".bold().blue());
    println!("{}Test users: {}", "• ".cyan(), model.number_of_test_users());
    println!("{}Test items: {}", "• ".cyan(), model.number_of_test_items());
    println!("{}Test ratings: {}", "• ".cyan(), model.number_of_test_ratings());

    let most_active = model.users().iter().max_by_key(|u| u.number_of_ratings());
    if let Some(user) = most_active {
        println!(
            "{}Most active user: {} ({} ratings)",
            "• ".cyan(),
            user.user_code(),
            user.number_of_ratings()
        );
    }
    Ok(())
}

/// Handle the 'fit' command
fn handle_fit(cli: &Cli, model: Arc<DataModel>) -> Result<Box<dyn Recommender>> {
    let config = resolve_config(cli)?;
    info!(config = ?config, "Training recommender");

    let mut recommender = config.build(model)?;
    let start = Instant::now();
    recommender
        .fit()
        .with_context(|| format!("Failed to train {}", recommender.name()))?;
    println!(
        "{} Trained {} in {:?}",
        "✓".green(),
        recommender.name().bold(),
        start.elapsed()
    );
    Ok(recommender)
}

/// Handle the 'predict' command
fn handle_predict(cli: &Cli, model: Arc<DataModel>, user: &str, item: &str) -> Result<()> {
    let user_index = model
        .user_index(user)
        .ok_or_else(|| anyhow!("User {} not found", user))?;
    let item_index = model
        .item_index(item)
        .ok_or_else(|| anyhow!("Item {} not found", item))?;

    let recommender = handle_fit(cli, model.clone())?;
    let prediction = recommender.predict(user_index, item_index);

    let known = model.rating(user_index, item_index);
    if prediction.is_nan() {
        println!("{} Prediction for user {} / item {} is undefined", "✗".red(), user, item);
    } else {
        println!(
            "Predicted rating for user {} / item {}: {}",
            user,
            item,
            format!("{:.3}", prediction).bold()
        );
    }
    if let Some(rating) = known {
        println!("{}Training rating: {}", "• ".cyan(), rating);
    }
    Ok(())
}

/// Handle the 'recommend' command
fn handle_recommend(cli: &Cli, model: Arc<DataModel>, user: &str, limit: usize) -> Result<()> {
    let user_index = model
        .user_index(user)
        .ok_or_else(|| anyhow!("User {} not found", user))?;
    let rated = model
        .user(user_index)
        .ok_or_else(|| anyhow!("User {} not found", user))?;

    // Candidates are the items the user has not rated
    let candidates: Vec<usize> = (0..model.number_of_items())
        .filter(|&item| rated.find_item(item).is_none())
        .collect();

    let recommender = handle_fit(cli, model.clone())?;
    let ranked = recommender.recommend(user_index, &candidates, limit);

    println!(
        "{}",
        format!("Top {} recommendations for user {}:", limit, user).bold().blue()
    );
    if ranked.is_empty() {
        println!("  (no item could be scored)");
    }
    for (rank, item_index) in ranked.iter().enumerate() {
        let code = model
            .item(*item_index)
            .map(|item| item.item_code())
            .unwrap_or("?");
        println!(
            "{}. {} - Score: {:.3}",
            (rank + 1).to_string().green(),
            code,
            recommender.predict(user_index, *item_index)
        );
    }
    Ok(())
}
