pub mod city;
pub mod date_window;
pub mod weather_frame;
pub mod weather_row;
