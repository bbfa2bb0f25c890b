// src/models/auth.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// A autenticação em si vive no serviço de contas; aqui só decodificamos o
// token e carregamos a identidade do ator para dentro dos handlers.

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // Subject (ID do usuário)
    pub exp: usize, // Expiration time (quando o token expira)
    pub iat: usize, // Issued At (quando o token foi criado)
    // Ponto de venda ao qual o ator está vinculado (nulo para a direção)
    pub salespoint_id: Option<Uuid>,
    pub role: String,
}

// Identidade já validada, disponível via extensions da requisição
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub salespoint_id: Option<Uuid>,
    pub role: String,
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Actor {
            user_id: claims.sub,
            salespoint_id: claims.salespoint_id,
            role: claims.role,
        }
    }
}
