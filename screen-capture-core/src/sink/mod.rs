pub mod track_sink;
