use std::io::Write;

use himmi_client::{ControlPlaneClient, ModelInfo, providers};

/// Print the model catalog, optionally limited to one provider
pub async fn print(client: &ControlPlaneClient, provider: Option<&str>) -> anyhow::Result<()> {
    let models = client.list_models().await?;
    let selected: Vec<&ModelInfo> = models
        .iter()
        .filter(|model| provider.is_none_or(|wanted| published_by(model, wanted)))
        .collect();

    let mut out = std::io::stdout().lock();

    if selected.is_empty() {
        writeln!(out, "no models found")?;
        let known = providers(&models);
        if !known.is_empty() {
            writeln!(out, "providers: {}", known.join(", "))?;
        }
        return Ok(());
    }

    writeln!(out, "{:<40} {:<16} {:>12} {:>12}", "MODEL", "PROVIDER", "INPUT/1M", "OUTPUT/1M")?;
    for model in selected {
        let pricing = model.pricing();
        writeln!(
            out,
            "{:<40} {:<16} {:>12} {:>12}",
            model.slug,
            model.provider().unwrap_or("-"),
            format!("${:.2}", pricing.input_cost_per_million_tokens),
            format!("${:.2}", pricing.output_cost_per_million_tokens),
        )?;
    }

    Ok(())
}

fn published_by(model: &ModelInfo, provider: &str) -> bool {
    model
        .provider()
        .is_some_and(|name| name.eq_ignore_ascii_case(provider))
}
