use std::time::Duration;
use wharfd_models::Config;
use wharfd_packaging::{BuildRecipe, StartCommand};
use wharfd_supervisor::{bind_shared, PoolSettings, WorkerCommand, WorkerPool, READY_LINE};

/// The CMD the build stage bakes into an image is the exact invocation the
/// supervisor binary accepts.
#[test]
fn image_cmd_matches_the_supervisor_cli() {
    let config = Config::default();
    let recipe = BuildRecipe::from_config(
        &config.build,
        StartCommand {
            bind: format!("0.0.0.0:{}", config.build.expose_port),
            workers: config.pool.workers,
            entry_point: "abroad.wsgi:application".parse().unwrap(),
        },
    );

    let rendered = recipe.render();
    assert!(rendered.contains(
        "CMD [\"wharfd\", \"--bind\", \"0.0.0.0:443\", \"--workers\", \"2\", \"abroad.wsgi:application\"]"
    ));
    assert!(rendered.contains("EXPOSE 443"));
}

#[tokio::test]
async fn listening_socket_accepts_for_the_pool_lifetime() {
    let listener = bind_shared("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let pool = WorkerPool::new(
        PoolSettings {
            workers: 2,
            graceful_timeout: Duration::from_secs(5),
        },
        listener,
        WorkerCommand::new(
            "/bin/sh",
            vec![
                "-c".to_string(),
                format!("echo \"{READY_LINE}\"; trap 'exit 0' TERM; while :; do sleep 0.05; done"),
            ],
        ),
    );

    let client = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio::net::TcpStream::connect(addr).await.is_ok()
    });

    let report = pool
        .run(tokio::time::sleep(Duration::from_millis(500)))
        .await
        .unwrap();

    assert!(client.await.unwrap(), "socket refused while pool was live");
    assert_eq!(report.exited_clean, 2);
}
