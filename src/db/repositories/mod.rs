mod supervisor_state;
