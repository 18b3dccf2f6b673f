use sync_cli::fitbit_sync_opts::FitbitSyncOpts;

#[tokio::main]
async fn main() {
    env_logger::init();

    match FitbitSyncOpts::process_args().await {
        Ok(_) => (),
        Err(e) => {
            if e.to_string().contains("Broken pipe") {
            } else {
                panic!("{}", e)
            }
        }
    }
}
