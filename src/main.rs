use std::{
    fs,
    io::{self, Write},
    path::Path,
    process,
    sync::Arc,
};

use kmlmap::{
    application::{error::AppError, repos::LayerCatalog, service::KmlMapService},
    config,
    infra::{
        catalog::CatalogStore,
        client::build_client,
        error::InfraError,
        overlay::HttpOverlayRenderer,
        remote::WfsFeatureSource,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(i32::from(error.exit_code()));
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.joined(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.joined(), "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    telemetry::init(&settings.logging)?;

    let catalog = Arc::new(load_catalog(&settings)?);

    match cli_args.command {
        config::Command::Render(args) => run_render(&settings, catalog, args),
        config::Command::Layers => run_layers(catalog.as_ref()),
    }
}

fn load_catalog(settings: &config::Settings) -> Result<CatalogStore, InfraError> {
    let path = settings.catalog.path.as_deref().ok_or_else(|| {
        InfraError::configuration("no catalog configured; set `catalog.path` or pass --catalog")
    })?;
    CatalogStore::load(path)
}

fn run_render(
    settings: &config::Settings,
    catalog: Arc<CatalogStore>,
    args: config::RenderArgs,
) -> Result<(), AppError> {
    let client = build_client(settings.overlay.timeout)?;
    let service = KmlMapService::new(
        catalog.clone(),
        catalog.clone(),
        catalog,
        Arc::new(HttpOverlayRenderer::new(client.clone())),
        settings.map_service_config(),
    )
    .with_remote_features(Arc::new(WfsFeatureSource::new(client)));

    let output = service.render_query(&args.query)?;

    info!(
        target = "kmlmap::render",
        mime_type = output.mime_type,
        content_disposition = output.content_disposition.as_deref().unwrap_or(""),
        bytes = output.body.len(),
        "map rendered"
    );

    match args.output.as_deref() {
        Some(path) => write_file(path, &output.body)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&output.body).map_err(InfraError::from)?;
            stdout.flush().map_err(InfraError::from)?;
        }
    }
    Ok(())
}

fn write_file(path: &Path, body: &[u8]) -> Result<(), InfraError> {
    fs::write(path, body)?;
    info!(
        target = "kmlmap::render",
        path = %path.display(),
        "response written"
    );
    Ok(())
}

fn run_layers(catalog: &CatalogStore) -> Result<(), AppError> {
    let layers = catalog
        .list_layers()
        .map_err(|err| AppError::unexpected(format!("failed to list layers: {err}")))?;

    let mut stdout = io::stdout().lock();
    for layer in layers {
        writeln!(
            stdout,
            "{}\t{}\t{}",
            layer.name,
            layer.kind.as_str(),
            layer.default_style
        )
        .map_err(InfraError::from)?;
    }
    Ok(())
}
