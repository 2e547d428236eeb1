mod durability;
mod fatal_cascade;
mod spawn_and_wait;
