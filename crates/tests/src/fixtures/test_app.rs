use jsonwebtoken::{encode, EncodingKey, Header};
use meetsfu_api::{build_router, state::AppState};
use meetsfu_config::{
    AppSettings, DatabaseSettings, JwtSettings, MediasoupSettings, Settings, SmtpSettings,
    TurnSettings,
};
use meetsfu_services::Claims;
use mongodb::{options::ClientOptions, Client, Database};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

/// A running signaling server with its own MongoDB database.
///
/// Requires a running MongoDB at `mongodb://localhost:27019` (override with
/// `MEETSFU__DATABASE__URL`) and a `mediasoup-worker` binary on `PATH` — the
/// same preconditions the production server needs. Each instance gets a
/// unique database name for isolation between tests.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub ws_url: String,
    pub db: Database,
    pub settings: Settings,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Spawn a test server, letting the caller tweak settings after defaults
    /// are applied (e.g. to toggle a feature flag or shrink a rate limit).
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let db_name = format!("meetsfu_test_{}", uuid::Uuid::new_v4().simple());

        let mut settings = test_settings(&db_name);
        if let Ok(url) = std::env::var("MEETSFU__DATABASE__URL") {
            settings.database.url = url;
        }
        mutator(&mut settings);

        let client_options = ClientOptions::parse(&settings.database.url)
            .await
            .expect("failed to parse MongoDB URL");
        let mongo_client = Client::with_options(client_options).expect("failed to create MongoDB client");
        let db = mongo_client.database(&settings.database.name);

        meetsfu_db::ensure_indexes(&db).await.expect("failed to create indexes");

        let app_state = AppState::new(db.clone(), settings.clone())
            .await
            .expect("failed to build AppState");
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{addr}");
        let ws_url = format!("ws://{addr}/ws");
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build HTTP client");

        Self {
            addr,
            base_url,
            ws_url,
            db,
            settings,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Mints a bearer token accepted by this instance's `AuthVerifier`, the
    /// same shape the out-of-scope login flow would hand a client.
    pub fn mint_token(&self, user_id: &str, email: &str, name: &str) -> String {
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            picture: None,
            exp: now_unix() + 3600,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.settings.jwt.secret.as_bytes()),
        )
        .expect("failed to sign test token")
    }

    /// The `/ws` URL with a bearer token attached as a query parameter, the
    /// shape `ws_upgrade`'s extractor expects.
    pub fn ws_url_for(&self, token: &str) -> String {
        format!("{}?token={}", self.ws_url, token)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let db = self.db.clone();
        tokio::spawn(async move {
            let _ = db.drop().await;
        });
    }
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn test_settings(db_name: &str) -> Settings {
    Settings {
        app: AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        database: DatabaseSettings {
            url: "mongodb://localhost:27019".to_string(),
            name: db_name.to_string(),
            max_pool_size: Some(5),
            min_pool_size: Some(1),
        },
        jwt: JwtSettings {
            secret: "test-secret-key-for-jwt-signing".to_string(),
            issuer: "meetsfu".to_string(),
        },
        mediasoup: MediasoupSettings {
            num_workers: 1,
            listen_ip: "0.0.0.0".to_string(),
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 41000,
            rtc_max_port: 41100,
        },
        turn: TurnSettings {
            secret: "test-turn-secret".to_string(),
            server_url: "turn:127.0.0.1:3478".to_string(),
            credential_ttl_secs: 3600,
        },
        smtp: SmtpSettings {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: None,
            tls: "starttls".to_string(),
        },
    }
}
