pub mod answer_service;
pub mod dispatcher;
pub mod documentation;
pub mod fanout;
pub mod game_service;
pub mod health_service;
pub mod presence_service;
pub mod public_service;
pub mod scoring;
pub mod session_service;
pub mod sse_service;
pub mod storage_supervisor;
pub mod websocket_service;
