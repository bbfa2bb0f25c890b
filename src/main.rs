// src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gestock::config::AppState;
use gestock::middleware::auth::auth_middleware;
use gestock::{docs, handlers};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é adequado aqui: se a configuração falhar, a aplicação não
    // deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    let stock_routes = Router::new()
        .route("/{salespoint_id}/levels", get(handlers::stock::list_levels))
        .route(
            "/{salespoint_id}/transactions",
            get(handlers::stock::list_transactions),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ));

    let sales_routes = Router::new()
        .route("/", post(handlers::sales::create_sale_draft))
        .route("/{id}", get(handlers::sales::get_sale))
        .route("/number/{number}", get(handlers::sales::find_sale_by_number))
        .route("/{id}/approve", post(handlers::sales::approve_sale))
        .route("/{id}/cancel", post(handlers::sales::cancel_sale))
        .route("/{id}/reverse", post(handlers::sales::reverse_sale_same_day))
        .route(
            "/{id}/cancellation-requests",
            post(handlers::sales::create_cancellation_request),
        )
        .route(
            "/cancellations/{id}/approve",
            post(handlers::sales::approve_cancellation),
        )
        .route(
            "/cancellations/{id}/reject",
            post(handlers::sales::reject_cancellation),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ));

    let transfer_routes = Router::new()
        .route("/", post(handlers::transfers::save_draft))
        .route("/{id}/send", post(handlers::transfers::send))
        .route("/{id}/decide", post(handlers::transfers::decide))
        .route("/{id}/lines", get(handlers::transfers::list_lines))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ));

    let restock_routes = Router::new()
        .route("/", post(handlers::restocks::create_request))
        .route("/push", post(handlers::restocks::warehouse_push))
        .route("/{id}/send", post(handlers::restocks::send_request))
        .route("/{id}/decide", post(handlers::restocks::decide))
        .route("/{id}/validate", post(handlers::restocks::validate_lines))
        .route("/{id}/lines", get(handlers::restocks::list_lines))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ));

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .nest("/api/stock", stock_routes)
        .nest("/api/sales", sales_routes)
        .nest("/api/transfers", transfer_routes)
        .nest("/api/restocks", restock_routes)
        .with_state(app_state);

    // Inicia o servidor
    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("Erro no servidor Axum");
}
