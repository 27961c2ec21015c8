pub mod storage_server;
