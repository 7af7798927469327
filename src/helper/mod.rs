pub mod landmark_helper;
