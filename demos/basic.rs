use reqwest_retry_hooks::{attach_retry_policy, ExponentialDelay, HttpClient, RetryOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("RETRY_HOOKS_DEMO_URL")?;

    let client = HttpClient::default();
    attach_retry_policy(
        &client,
        RetryOptions::new()
            .retries(3)
            .retry_delay(ExponentialDelay::default())
            .on_retry(|retry_count, error, config| {
                eprintln!("retry {retry_count} of {} {}: {error}", config.method, config.url);
            }),
    );

    let response = client.get(&url).await?;
    println!("{} {}", response.status, response.text());

    Ok(())
}
