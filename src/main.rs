use decadegen::{
    logger::{self, LoggerConfig},
    prompt, DecadeGenerator, GenerationError, GenerationRequest, GeneratorConfig, HttpTransport,
    ImagePayload, UserHint,
};
use std::env;

const USAGE: &str = "usage:
  decadegen <image-path> [decade | instruction...]
  decadegen --album <image-path>
  decadegen --check [prompt...]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init_with_config(LoggerConfig::development().with_env_overrides())?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = GeneratorConfig::from_env();
    logger::log_config_info(&config);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--check") => check_connection(&config, &args[1..]).await,
        Some("--album") => match args.get(1) {
            Some(path) => generate_album(&config, path).await,
            None => usage(),
        },
        Some(path) => generate_one(&config, path, &args[1..]).await,
        None => usage(),
    }
}

fn usage() -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("{}", USAGE);
    Err("missing arguments".into())
}

async fn check_connection(
    config: &GeneratorConfig,
    words: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = if words.is_empty() {
        "Reply with the single word: ok".to_string()
    } else {
        words.join(" ")
    };

    let transport = HttpTransport::new(config)?;
    log::info!("🔄 Checking API connectivity...");
    let reply = transport.check_connection(&prompt).await?;
    log::info!("✅ API reachable, reply: {}", reply);
    Ok(())
}

async fn generate_one(
    config: &GeneratorConfig,
    path: &str,
    words: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let image = ImagePayload::from_file(path).await?;
    let request = match words {
        [] => GenerationRequest::for_decade(image, prompt::ALBUM_DECADES[0])?,
        [decade] if prompt::extract_decade(decade) == Some(decade.as_str()) => {
            GenerationRequest::for_decade(image, decade)?
        }
        _ => GenerationRequest::new(image, words.join(" "))?,
    };

    let generator = DecadeGenerator::new(config)?;
    log::info!("🎨 Generating image from {}", path);

    match generator.generate(&request).await {
        Ok(image) => {
            if let Some(decade) = &image.fallback_decade {
                log::warn!("💡 Used the {} fallback instruction", decade);
            }
            log::info!("✅ Image ready after {} call(s)", image.transport_calls);
            println!("{}", image.url);
            Ok(())
        }
        Err(e) => {
            report_failure(&e);
            Err(e.into())
        }
    }
}

async fn generate_album(
    config: &GeneratorConfig,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = ImagePayload::from_file(path).await?;
    let generator = DecadeGenerator::new(config)?;

    log::info!("📸 Generating a {}-decade album from {}", prompt::ALBUM_DECADES.len(), path);
    let album = generator
        .generate_album(&image, &prompt::ALBUM_DECADES)
        .await;

    let mut failures = 0;
    for entry in &album {
        match &entry.outcome {
            Ok(image) => println!("{}\t{}", entry.decade, image.url),
            Err(e) => {
                failures += 1;
                log::error!("❌ {}: {}", entry.decade, e);
                report_failure(e);
            }
        }
    }

    if failures == album.len() {
        return Err("every decade failed".into());
    }
    Ok(())
}

fn report_failure(error: &GenerationError) {
    match error.user_hint() {
        UserHint::TryLater => {
            log::warn!("💡 The service is having trouble right now, try again later")
        }
        UserHint::TryDifferentInput => {
            log::warn!("💡 The model declined this photo or instruction, try a different one")
        }
        UserHint::Generic => log::warn!("💡 Generation failed: {}", error),
    }
}
